use crate::action::{ActionConfig, ActionContext, ActionKind};
use crate::error::{DriverError, Result};
use crate::registry::BuildContext;
use std::time::Duration;

// ---------------------------------------------------------------------------
// SetVariable
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum ValueKind {
    String,
    Int,
    Bool,
}

struct SetVariable {
    name: String,
    value: String,
    kind: ValueKind,
}

pub fn set_variable(config: &ActionConfig, _: &BuildContext<'_>) -> Result<Box<dyn ActionKind>> {
    let p = &config.params;
    let name = p.required("name")?;
    let value = p.required("value")?;
    let kind = match p.get("kind").unwrap_or("string") {
        "string" => ValueKind::String,
        "int" | "integer" => ValueKind::Int,
        "bool" | "boolean" => ValueKind::Bool,
        other => return Err(p.invalid("kind", other)),
    };
    Ok(Box::new(SetVariable { name, value, kind }))
}

impl ActionKind for SetVariable {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        let value = ctx.resolve(&self.value);
        let store = ctx.store();
        match self.kind {
            ValueKind::String => store.store(self.name.clone(), value),
            ValueKind::Int => {
                let n: i64 = value.trim().parse().map_err(|_| {
                    DriverError::ActionFailed(format!("'{value}' is not an integer"))
                })?;
                store.store(self.name.clone(), n);
            }
            ValueKind::Bool => {
                let b: bool = value.trim().parse().map_err(|_| {
                    DriverError::ActionFailed(format!("'{value}' is not a boolean"))
                })?;
                store.store(self.name.clone(), b);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RemoveVariable
// ---------------------------------------------------------------------------

struct RemoveVariable {
    name: String,
}

pub fn remove_variable(
    config: &ActionConfig,
    _: &BuildContext<'_>,
) -> Result<Box<dyn ActionKind>> {
    let name = config.params.required("name")?;
    Ok(Box::new(RemoveVariable { name }))
}

impl ActionKind for RemoveVariable {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        ctx.store()
            .remove(&self.name)
            .map(|_| ())
            .ok_or_else(|| DriverError::UndefinedVariable(self.name.clone()))
    }
}

// ---------------------------------------------------------------------------
// CompareStrings
// ---------------------------------------------------------------------------

enum Operand {
    Variable(String),
    Literal(String),
}

struct CompareStrings {
    first: String,
    second: Operand,
}

/// `first` names a variable; compare it against variable `second` or the
/// literal `value`.
pub fn compare_strings(
    config: &ActionConfig,
    _: &BuildContext<'_>,
) -> Result<Box<dyn ActionKind>> {
    let p = &config.params;
    let first = p.required("first")?;
    let second = match (p.optional("second"), p.optional("value")) {
        (Some(name), _) => Operand::Variable(name),
        (None, Some(literal)) => Operand::Literal(literal),
        // neither given: report the variable form as the missing one
        (None, None) => return Err(p.missing("second")),
    };
    Ok(Box::new(CompareStrings { first, second }))
}

impl ActionKind for CompareStrings {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<()> {
        let left = ctx.store().get_as::<String>(&self.first)?;
        let (label, right) = match &self.second {
            Operand::Variable(name) => {
                let v = ctx.store().get_as::<String>(name)?;
                (format!("'{name}'"), v.as_str().to_string())
            }
            Operand::Literal(raw) => ("literal".to_string(), ctx.resolve(raw)),
        };
        if left.as_str() != right {
            return Err(DriverError::ActionFailed(format!(
                "'{}' = {:?} does not match {label} = {right:?}",
                self.first,
                left.as_str()
            )));
        }
        ctx.detail(&format!("'{}' matches {label}", self.first));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sleep
// ---------------------------------------------------------------------------

struct Sleep {
    duration: Duration,
}

pub fn sleep(config: &ActionConfig, _: &BuildContext<'_>) -> Result<Box<dyn ActionKind>> {
    let ms: u64 = config.params.parse_required("duration_ms")?;
    Ok(Box::new(Sleep {
        duration: Duration::from_millis(ms),
    }))
}

impl ActionKind for Sleep {
    fn run(&mut self, _ctx: &ActionContext<'_>) -> Result<()> {
        std::thread::sleep(self.duration);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::action::{ActionConfig, Outcome};
    use crate::actions::testing::{build, runtime};
    use crate::config::DriverConfig;
    use crate::error::DriverError;
    use crate::registry::default_registry;

    #[test]
    fn set_variable_stores_typed_values() {
        let rt = runtime();
        let mut a = build(
            ActionConfig::new("s1", "SetVariable", "t1")
                .with_param("name", "n")
                .with_param("value", "42")
                .with_param("kind", "int"),
        );
        assert!(a.execute(&rt));
        assert_eq!(*rt.store.get_as::<i64>("n").unwrap(), 42);
    }

    #[test]
    fn set_variable_rejects_unknown_kind_at_build() {
        let config = ActionConfig::new("s1", "SetVariable", "t1")
            .with_param("name", "n")
            .with_param("value", "1")
            .with_param("kind", "float");
        let err = default_registry()
            .build(&config, &DriverConfig::default())
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidParameter { .. }));
    }

    #[test]
    fn compare_equal_strings_passes() {
        let rt = runtime();
        rt.store.store("a", "x".to_string());
        rt.store.store("b", "x".to_string());
        let mut a = build(
            ActionConfig::new("c1", "CompareStrings", "t1")
                .with_param("first", "a")
                .with_param("second", "b"),
        );
        assert!(a.execute(&rt));
    }

    #[test]
    fn compare_unequal_strings_fails() {
        let rt = runtime();
        rt.store.store("a", "x".to_string());
        let mut a = build(
            ActionConfig::new("c1", "CompareStrings", "t1")
                .with_param("first", "a")
                .with_param("value", "y"),
        );
        assert!(!a.execute(&rt));
        match a.outcome() {
            Outcome::Failed { reason } => assert!(reason.contains("does not match")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn compare_needs_second_operand() {
        let config = ActionConfig::new("c1", "CompareStrings", "t1").with_param("first", "a");
        let err = default_registry()
            .build(&config, &DriverConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            DriverError::MissingParameter { ref param, .. } if param == "second"
        ));
    }

    #[test]
    fn remove_missing_variable_fails() {
        let rt = runtime();
        let mut a = build(ActionConfig::new("r1", "RemoveVariable", "t1").with_param("name", "x"));
        assert!(!a.execute(&rt));
        rt.store.store("x", true);
        let mut b = build(ActionConfig::new("r2", "RemoveVariable", "t1").with_param("name", "x"));
        assert!(b.execute(&rt));
        assert!(!rt.store.contains("x"));
    }

    #[test]
    fn sleep_requires_numeric_duration() {
        let config = ActionConfig::new("z1", "Sleep", "t1").with_param("duration_ms", "soon");
        assert!(default_registry()
            .build(&config, &DriverConfig::default())
            .is_err());
    }
}
