//! XML test-script loader.
//!
//! A script is a root element holding `<Action>` elements, each with
//! `<ActionParameter>` children (and, for composites, nested `<Action>`s).
//! `<include>` elements are replaced by the children of the included file's
//! root, recursively, while the tree is walked; nothing is constructed until
//! the whole tree has been read.

use crate::action::ActionConfig;
use crate::codes;
use crate::config::DriverConfig;
use crate::error::{DriverError, Result};
use roxmltree::{Document, Node, ParsingOptions};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ACTION: &str = "Action";
const PARAMETER: &str = "ActionParameter";

/// A parsed script: action configurations in declaration order.
#[derive(Debug, Clone)]
pub struct TestScript {
    pub name: String,
    /// Root-level `actionDelim`, if the script declares one.
    pub action_delim: Option<String>,
    pub actions: Vec<ActionConfig>,
    pub source: PathBuf,
}

impl TestScript {
    /// Delimiter for the filter list: the script's own, else the config's.
    pub fn delimiter<'a>(&'a self, config: &'a DriverConfig) -> &'a str {
        self.action_delim.as_deref().unwrap_or(&config.action_delim)
    }

    /// Keep only the top-level actions named in `filter`, in declaration order.
    ///
    /// An empty filter keeps everything. A name that matches no top-level
    /// action is an error.
    pub fn apply_filter(&mut self, filter: &str, delim: &str) -> Result<()> {
        let wanted: Vec<&str> = filter
            .split(delim)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }
        for name in &wanted {
            if !self.actions.iter().any(|a| a.id == *name) {
                return Err(DriverError::UnknownFilterName(name.to_string()));
            }
        }
        let before = self.actions.len();
        self.actions.retain(|a| wanted.contains(&a.id.as_str()));
        tracing::info!(
            code = codes::FILTER_APPLIED,
            kept = self.actions.len(),
            dropped = before - self.actions.len(),
            "action filter applied"
        );
        Ok(())
    }

    /// Total number of actions, nested composite children included.
    pub fn action_count(&self) -> usize {
        fn count(actions: &[ActionConfig]) -> usize {
            actions.iter().map(|a| 1 + count(&a.children)).sum()
        }
        count(&self.actions)
    }
}

/// Read `path`, inline its includes, and collect every action configuration.
pub fn load_script(path: &Path, config: &DriverConfig) -> Result<TestScript> {
    let mut loader = Loader { stack: Vec::new() };
    let text = read(path)?;
    let doc = parse(path, &text)?;
    let root = doc.root_element();
    loader.enter(path)?;
    let actions = loader.children(root, path, &config.default_thread)?;
    loader.stack.pop();

    let mut seen = HashSet::new();
    check_unique(&actions, &mut seen)?;

    let name = root
        .attribute("name")
        .map(str::to_string)
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "test".to_string());
    let action_delim = root
        .attribute("actionDelim")
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    let script = TestScript {
        name,
        action_delim,
        actions,
        source: path.to_path_buf(),
    };
    tracing::info!(
        code = codes::SCRIPT_LOADED,
        test = %script.name,
        path = %path.display(),
        actions = script.action_count(),
        "test script loaded"
    );
    Ok(script)
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

struct Loader {
    /// Canonical paths of the files currently being read, outermost first.
    stack: Vec<PathBuf>,
}

impl Loader {
    fn enter(&mut self, path: &Path) -> Result<()> {
        let canonical = std::fs::canonicalize(path).map_err(|source| DriverError::ScriptRead {
            path: path.to_path_buf(),
            source,
        })?;
        if self.stack.contains(&canonical) {
            return Err(DriverError::IncludeCycle(path.to_path_buf()));
        }
        self.stack.push(canonical);
        Ok(())
    }

    /// Collect the `<Action>` children of `parent`, expanding includes.
    fn children(&mut self, parent: Node<'_, '_>, path: &Path, thread: &str) -> Result<Vec<ActionConfig>> {
        let mut out = Vec::new();
        for node in parent.children().filter(Node::is_element) {
            let tag = node.tag_name().name();
            if tag == ACTION {
                out.push(self.action(node, path, thread)?);
            } else if tag.eq_ignore_ascii_case("include") {
                out.extend(self.include(node, path, thread)?);
            } else if tag != PARAMETER {
                tracing::debug!(
                    code = codes::ELEMENT_IGNORED,
                    element = tag,
                    path = %path.display(),
                    "ignoring unknown element"
                );
            }
        }
        Ok(out)
    }

    fn include(&mut self, node: Node<'_, '_>, path: &Path, thread: &str) -> Result<Vec<ActionConfig>> {
        let target = node
            .attribute("file")
            .map(str::to_string)
            .or_else(|| node.text().map(|t| t.trim().to_string()))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DriverError::MissingAttribute {
                element: "include".to_string(),
                attribute: "file".to_string(),
                path: path.to_path_buf(),
            })?;
        let target = match path.parent() {
            Some(dir) => dir.join(target),
            None => PathBuf::from(target),
        };

        self.enter(&target)?;
        let text = read(&target)?;
        let doc = parse(&target, &text)?;
        let actions = self.children(doc.root_element(), &target, thread)?;
        self.stack.pop();

        tracing::debug!(
            code = codes::INCLUDE_INLINED,
            from = %path.display(),
            file = %target.display(),
            actions = actions.len(),
            "include inlined"
        );
        Ok(actions)
    }

    fn action(&mut self, node: Node<'_, '_>, path: &Path, inherited_thread: &str) -> Result<ActionConfig> {
        let id = required_attribute(node, "name", path)?;
        let action_type = required_attribute(node, "type", path)?;
        let thread = node
            .attribute("threadId")
            .or_else(|| node.attribute("thread"))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(inherited_thread)
            .to_string();

        let mut config = ActionConfig::new(id, action_type, thread);
        config.source = path.to_path_buf();
        if let Some(raw) = node.attribute("continueOnFailure") {
            config.continue_on_failure = parse_bool(raw)
                .ok_or_else(|| invalid_attribute(&config, "continueOnFailure", raw))?;
        }
        if let Some(raw) = node.attribute("repeat") {
            config.repeat = raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| invalid_attribute(&config, "repeat", raw))?;
        }
        if let Some(raw) = node.attribute("repeat_interval") {
            let ms = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| invalid_attribute(&config, "repeat_interval", raw))?;
            config.repeat_interval = Duration::from_millis(ms);
        }

        for param in node
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == PARAMETER)
        {
            let name = required_attribute(param, "name", path)?;
            let value: String = param
                .descendants()
                .filter(Node::is_text)
                .filter_map(|n| n.text())
                .collect();
            config.params.insert(name, value.trim())?;
        }

        // nested actions run on their parent's worker
        let thread = config.thread.clone();
        config.children = self.children(node, path, &thread)?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| DriverError::ScriptRead {
        path: path.to_path_buf(),
        source,
    })
}

fn parse<'t>(path: &Path, text: &'t str) -> Result<Document<'t>> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(text, options).map_err(|source| DriverError::MalformedXml {
        path: path.to_path_buf(),
        source,
    })
}

fn required_attribute(node: Node<'_, '_>, attribute: &str, path: &Path) -> Result<String> {
    node.attribute(attribute)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| DriverError::MissingAttribute {
            element: node.tag_name().name().to_string(),
            attribute: attribute.to_string(),
            path: path.to_path_buf(),
        })
}

fn invalid_attribute(config: &ActionConfig, attribute: &str, value: &str) -> DriverError {
    DriverError::InvalidAttribute {
        action: config.id.clone(),
        attribute: attribute.to_string(),
        value: value.to_string(),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn check_unique(actions: &[ActionConfig], seen: &mut HashSet<String>) -> Result<()> {
    for action in actions {
        if !seen.insert(action.id.clone()) {
            return Err(DriverError::DuplicateActionId(action.id.clone()));
        }
        check_unique(&action.children, seen)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn load(path: &Path) -> Result<TestScript> {
        load_script(path, &DriverConfig::default())
    }

    #[test]
    fn parses_actions_and_parameters() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "basic.xml",
            r#"<?xml version="1.0"?>
<Test name="smoke" actionDelim=";">
  <Action name="a1" type="SetVariable" threadId="t1" continueOnFailure="true">
    <ActionParameter name="name">greeting</ActionParameter>
    <ActionParameter name="value">
      hello
    </ActionParameter>
  </Action>
  <Action name="a2" type="Sleep" repeat="3" repeat_interval="10">
    <ActionParameter name="duration_ms">1</ActionParameter>
  </Action>
</Test>"#,
        );
        let script = load(&path).unwrap();
        assert_eq!(script.name, "smoke");
        assert_eq!(script.action_delim.as_deref(), Some(";"));
        assert_eq!(script.actions.len(), 2);

        let a1 = &script.actions[0];
        assert_eq!(a1.thread, "t1");
        assert!(a1.continue_on_failure);
        assert_eq!(a1.params.get("value"), Some("hello"));

        let a2 = &script.actions[1];
        assert_eq!(a2.thread, "1");
        assert_eq!(a2.repeat, 3);
        assert_eq!(a2.repeat_interval, Duration::from_millis(10));
    }

    #[test]
    fn name_defaults_to_file_stem() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "queue_roundtrip.xml", "<Test/>");
        assert_eq!(load(&path).unwrap().name, "queue_roundtrip");
    }

    #[test]
    fn include_is_inlined_in_place() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("common")).unwrap();
        write(
            &dir,
            "common/setup.xml",
            r#"<Setup>
  <Action name="inc1" type="Sleep"><ActionParameter name="duration_ms">1</ActionParameter></Action>
  <include file="more.xml"/>
</Setup>"#,
        );
        write(
            &dir,
            "common/more.xml",
            r#"<More><Action name="inc2" type="Sleep"><ActionParameter name="duration_ms">1</ActionParameter></Action></More>"#,
        );
        let path = write(
            &dir,
            "main.xml",
            r#"<Test>
  <Action name="first" type="Sleep"><ActionParameter name="duration_ms">1</ActionParameter></Action>
  <include>common/setup.xml</include>
  <Action name="last" type="Sleep"><ActionParameter name="duration_ms">1</ActionParameter></Action>
</Test>"#,
        );
        let ids: Vec<String> = load(&path)
            .unwrap()
            .actions
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["first", "inc1", "inc2", "last"]);
    }

    #[test]
    fn include_cycle_is_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.xml", "<A><include>b.xml</include></A>");
        write(&dir, "b.xml", "<B><include>a.xml</include></B>");
        let err = load(&dir.path().join("a.xml")).unwrap_err();
        assert!(matches!(err, DriverError::IncludeCycle(_)), "{err}");
        assert!(err.is_configuration());
    }

    #[test]
    fn malformed_xml_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "bad.xml", "<Test><Action name=\"a\" type=\"Sleep\"></Test>");
        let err = load(&path).unwrap_err();
        assert!(matches!(err, DriverError::MalformedXml { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn missing_type_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "t.xml", r#"<Test><Action name="a1"/></Test>"#);
        let err = load(&path).unwrap_err();
        assert!(matches!(
            err,
            DriverError::MissingAttribute { ref element, ref attribute, .. }
                if element == "Action" && attribute == "type"
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected_across_nesting() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "dup.xml",
            r#"<Test>
  <Action name="x" type="Sleep"/>
  <Action name="block" type="CompositeAction"><Action name="x" type="Sleep"/></Action>
</Test>"#,
        );
        let err = load(&path).unwrap_err();
        assert!(matches!(err, DriverError::DuplicateActionId(ref id) if id == "x"));
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "dup.xml",
            r#"<Test><Action name="a" type="Sleep">
  <ActionParameter name="duration_ms">1</ActionParameter>
  <ActionParameter name="duration_ms">2</ActionParameter>
</Action></Test>"#,
        );
        assert!(matches!(
            load(&path).unwrap_err(),
            DriverError::DuplicateParameter { .. }
        ));
    }

    #[test]
    fn bad_repeat_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "r.xml", r#"<Test><Action name="a" type="Sleep" repeat="0"/></Test>"#);
        assert!(matches!(
            load(&path).unwrap_err(),
            DriverError::InvalidAttribute { ref attribute, .. } if attribute == "repeat"
        ));
    }

    #[test]
    fn nested_actions_inherit_thread() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "n.xml",
            r#"<Test><Action name="block" type="CompositeAction" threadId="w2">
  <Action name="inner" type="Sleep"/>
</Action></Test>"#,
        );
        let script = load(&path).unwrap();
        assert_eq!(script.actions.len(), 1);
        assert_eq!(script.actions[0].children[0].thread, "w2");
        assert_eq!(script.action_count(), 2);
    }

    #[test]
    fn filter_keeps_named_actions_in_order() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "f.xml",
            r#"<Test actionDelim="|">
  <Action name="a" type="Sleep"/><Action name="b" type="Sleep"/><Action name="c" type="Sleep"/>
</Test>"#,
        );
        let config = DriverConfig::default();
        let mut script = load_script(&path, &config).unwrap();
        let delim = script.delimiter(&config).to_string();
        assert_eq!(delim, "|");
        script.apply_filter("c | a", &delim).unwrap();
        let ids: Vec<&str> = script.actions.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn filter_with_unknown_name_fails() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "f.xml", r#"<Test><Action name="a" type="Sleep"/></Test>"#);
        let mut script = load(&path).unwrap();
        let err = script.apply_filter("a,zzz", ",").unwrap_err();
        assert!(matches!(err, DriverError::UnknownFilterName(ref n) if n == "zzz"));
    }
}
