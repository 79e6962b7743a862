//! Message codes attached as the `code` field of every trace event the driver
//! emits, so log lines can be grepped independently of their wording.

pub const SCRIPT_LOADED: &str = "TDRV1000";
pub const INCLUDE_INLINED: &str = "TDRV1001";
pub const ELEMENT_IGNORED: &str = "TDRV1002";
pub const FILTER_APPLIED: &str = "TDRV1003";
pub const PLAN_GROUPED: &str = "TDRV1010";
pub const PHASE_CHANGED: &str = "TDRV1011";

pub const GROUP_STARTED: &str = "TDRV2000";
pub const GROUP_FINISHED: &str = "TDRV2001";
pub const GROUP_ABORTED: &str = "TDRV2002";
pub const GROUP_PANICKED: &str = "TDRV2003";

pub const ACTION_STARTED: &str = "TDRV3000";
pub const ACTION_PASSED: &str = "TDRV3001";
pub const ACTION_FAILED: &str = "TDRV3002";
pub const ACTION_TOLERATED: &str = "TDRV3003";
pub const ACTION_CANCELLED: &str = "TDRV3004";
pub const ACTION_DETAIL: &str = "TDRV3005";

pub const CLEANUP_SWEEP: &str = "TDRV4000";
pub const CLEANUP_FAILED: &str = "TDRV4001";

pub const TEST_RESULT: &str = "TDRV5000";
