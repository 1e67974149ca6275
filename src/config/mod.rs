use std::{
    collections::{HashMap, HashSet},
    fmt, fs,
};

use log::{debug, trace, LevelFilter};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::{conductor::CloseMode, config_error, core::ScreenResult};

/// A scenario: the units to build, how they nest, and what to do with them.
#[derive(Default, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Config::validate_tree"))]
pub struct Config {
    #[serde(default)]
    #[validate(nested)]
    pub log: Log,

    /// Close mode of conductors that do not pick their own.
    #[serde(default)]
    pub close_strategy: CloseMode,

    #[serde(default)]
    #[validate(nested)]
    pub screens: Vec<ScreenConf>,

    #[validate(length(min = 1))]
    #[validate(nested)]
    pub conductors: Vec<ConductorConf>,

    pub root: String,

    #[serde(default)]
    #[validate(nested)]
    pub steps: Vec<Step>,
}

// Config file load and validation
impl Config {
    pub fn load_from_yaml<P>(path: P) -> ScreenResult<Self>
    where
        P: AsRef<std::path::Path>,
    {
        let path = path.as_ref();
        let conf_str = fs::read_to_string(path).map_err(|e| {
            config_error!("unable to read conf file from {}: {e}", path.display())
        })?;
        debug!("Conf file read from {}", path.display());
        Self::from_yaml(&conf_str)
    }

    pub fn from_yaml(conf_str: &str) -> ScreenResult<Self> {
        trace!("Read conf file: {conf_str}");
        let conf: Config = serde_yaml::from_str(conf_str)?;

        trace!("Loaded conf: {conf:?}");

        conf.validate()?;
        Ok(conf)
    }

    pub fn to_yaml(&self) -> ScreenResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn conductor(&self, id: &str) -> Option<&ConductorConf> {
        self.conductors.iter().find(|conductor| conductor.id == id)
    }

    pub fn screen(&self, id: &str) -> Option<&ScreenConf> {
        self.screens.iter().find(|screen| screen.id == id)
    }

    fn validate_tree(&self) -> Result<(), ValidationError> {
        let mut ids = HashSet::new();
        let declared = self
            .screens
            .iter()
            .map(|screen| screen.id.as_str())
            .chain(self.conductors.iter().map(|conductor| conductor.id.as_str()));
        for id in declared {
            if !ids.insert(id) {
                return Err(invalid("duplicate_id", format!("{id} is declared twice")));
            }
        }

        // member id -> id of the conductor that holds it
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for conductor in &self.conductors {
            if conductor.kind == ConductorKind::Single && conductor.items.len() > 1 {
                return Err(invalid(
                    "single_conductor_items",
                    format!("single conductor {} holds more than one item", conductor.id),
                ));
            }
            for member in &conductor.items {
                if !ids.contains(member.as_str()) {
                    return Err(invalid(
                        "unknown_reference",
                        format!("{} references unknown item {member}", conductor.id),
                    ));
                }
                if let Some(owner) = owners.insert(member, &conductor.id) {
                    return Err(invalid(
                        "shared_member",
                        format!("{member} is held by both {owner} and {}", conductor.id),
                    ));
                }
            }
        }

        if self.conductor(&self.root).is_none() {
            return Err(invalid(
                "unknown_root",
                format!("root {} is not a conductor", self.root),
            ));
        }
        if let Some(owner) = owners.get(self.root.as_str()) {
            return Err(invalid(
                "root_is_member",
                format!("root {} is a member of {owner}", self.root),
            ));
        }

        for conductor in &self.conductors {
            let mut current = conductor.id.as_str();
            let mut hops = 0;
            while let Some(owner) = owners.get(current) {
                if *owner == conductor.id {
                    return Err(invalid(
                        "cycle",
                        format!("{} ends up conducting itself", conductor.id),
                    ));
                }
                current = *owner;
                hops += 1;
                if hops > self.conductors.len() {
                    break;
                }
            }
        }

        for step in &self.steps {
            for id in step.target.iter().chain(step.item.iter()) {
                if !ids.contains(id.as_str()) {
                    return Err(invalid(
                        "unknown_reference",
                        format!("step {} references unknown unit {id}", step.action),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn invalid(code: &'static str, message: String) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Log {
    #[serde(default = "Log::default_level")]
    pub level: LevelFilter,
    /// Log file; stderr when unset.
    #[validate(length(min = 1))]
    pub path: Option<String>,
}

impl Log {
    fn default_level() -> LevelFilter {
        LevelFilter::Info
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            path: None,
        }
    }
}

/// A leaf unit driven by the scenario.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct ScreenConf {
    #[validate(length(min = 1))]
    pub id: String,
    pub display_name: Option<String>,
    /// Verdict of the close guard.
    #[serde(default = "ScreenConf::default_can_close")]
    pub can_close: bool,
    /// Make the activation hook fail.
    #[serde(default)]
    pub fail_activation: bool,
}

impl ScreenConf {
    fn default_can_close() -> bool {
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConductorKind {
    Single,
    OneActive,
    AllActive,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct ConductorConf {
    #[validate(length(min = 1))]
    pub id: String,
    pub display_name: Option<String>,
    pub kind: ConductorKind,
    /// Overrides [`Config::close_strategy`].
    pub close_strategy: Option<CloseMode>,
    /// Member ids, screens or conductors, in order.
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Activate,
    Deactivate,
    Close,
    ActivateItem,
    DeactivateItem,
    CloseItem,
    CanClose,
    TryClose,
}

impl Action {
    pub fn requires_item(self) -> bool {
        matches!(
            self,
            Action::ActivateItem | Action::DeactivateItem | Action::CloseItem
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Action::Activate => "activate",
            Action::Deactivate => "deactivate",
            Action::Close => "close",
            Action::ActivateItem => "activate_item",
            Action::DeactivateItem => "deactivate_item",
            Action::CloseItem => "close_item",
            Action::CanClose => "can_close",
            Action::TryClose => "try_close",
        };
        f.write_str(name)
    }
}

/// One scripted operation. `target` defaults to the root conductor.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Step::validate_item"))]
pub struct Step {
    pub action: Action,
    pub target: Option<String>,
    pub item: Option<String>,
}

impl Step {
    fn validate_item(&self) -> Result<(), ValidationError> {
        if self.action.requires_item() && self.item.is_none() {
            return Err(invalid(
                "item_required",
                format!("{} needs an item", self.action),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn assert_rejected(conf_str: &str, code: &str) {
        match Config::from_yaml(conf_str) {
            Err(crate::core::ScreenError::Validation(errors)) => {
                let rendered = errors.to_string();
                assert!(rendered.contains(code), "{code} not in {rendered}");
            }
            other => panic!("expected validation failure {code}, got {other:?}"),
        }
    }

    #[test]
    fn not_a_test_i_cannot_write_yaml_by_hand() {
        init_log();
        let conf = Config::default();
        // cargo test -- --nocapture not_a_test_i_cannot_write_yaml_by_hand
        println!("{}", conf.to_yaml().unwrap());
    }

    #[test]
    fn test_load_file() {
        init_log();
        let conf_str = r#"
---
log:
  level: debug

close_strategy: stop_at_first_refusal

screens:
  - id: editor
    display_name: Editor
  - id: preview
    can_close: false
  - id: console
    fail_activation: true

conductors:
  - id: shell
    kind: single
    items: [tabs]
  - id: tabs
    kind: one_active
    close_strategy: evaluate_all
    items: [editor, preview]
  - id: panels
    kind: all_active
    items: [console]

root: shell

steps:
  - action: activate
  - action: close_item
    target: tabs
    item: preview
  - action: can_close
        "#;
        let conf = Config::from_yaml(conf_str).unwrap();
        assert_eq!(LevelFilter::Debug, conf.log.level);
        assert!(conf.log.path.is_none());
        assert_eq!(CloseMode::StopAtFirstRefusal, conf.close_strategy);
        assert_eq!(3, conf.screens.len());
        assert_eq!(3, conf.conductors.len());
        assert_eq!(3, conf.steps.len());

        let preview = conf.screen("preview").unwrap();
        assert!(!preview.can_close);
        assert!(!preview.fail_activation);
        assert!(conf.screen("editor").unwrap().can_close);

        let tabs = conf.conductor("tabs").unwrap();
        assert_eq!(ConductorKind::OneActive, tabs.kind);
        assert_eq!(Some(CloseMode::EvaluateAll), tabs.close_strategy);
        assert_eq!(Action::CloseItem, conf.steps[1].action);
        assert_eq!(None, conf.steps[0].target);
        print!("{}", conf.to_yaml().unwrap());
    }

    #[test]
    fn test_valid_conductors_length() {
        init_log();
        let conf_str = r#"
conductors: []
root: shell
        "#;
        assert!(Config::from_yaml(conf_str).is_err());
    }

    #[test]
    fn test_valid_duplicate_id() {
        init_log();
        let conf_str = r#"
screens:
  - id: shell
conductors:
  - id: shell
    kind: single
root: shell
        "#;
        assert_rejected(conf_str, "declared twice");
    }

    #[test]
    fn test_valid_unknown_member() {
        init_log();
        let conf_str = r#"
conductors:
  - id: shell
    kind: one_active
    items: [ghost]
root: shell
        "#;
        assert_rejected(conf_str, "unknown item ghost");
    }

    #[test]
    fn test_valid_shared_member() {
        init_log();
        let conf_str = r#"
screens:
  - id: editor
conductors:
  - id: shell
    kind: one_active
    items: [left, right]
  - id: left
    kind: one_active
    items: [editor]
  - id: right
    kind: all_active
    items: [editor]
root: shell
        "#;
        assert_rejected(conf_str, "is held by both");
    }

    #[test]
    fn test_valid_single_conductor_items() {
        init_log();
        let conf_str = r#"
screens:
  - id: a
  - id: b
conductors:
  - id: shell
    kind: single
    items: [a, b]
root: shell
        "#;
        assert_rejected(conf_str, "more than one item");
    }

    #[test]
    fn test_valid_root() {
        init_log();
        let conf_str = r#"
screens:
  - id: a
conductors:
  - id: shell
    kind: single
root: a
        "#;
        assert_rejected(conf_str, "is not a conductor");

        let conf_str = r#"
conductors:
  - id: shell
    kind: single
    items: [inner]
  - id: inner
    kind: one_active
root: inner
        "#;
        assert_rejected(conf_str, "is a member of shell");
    }

    #[test]
    fn test_valid_cycle() {
        init_log();
        let conf_str = r#"
conductors:
  - id: shell
    kind: one_active
  - id: left
    kind: one_active
    items: [right]
  - id: right
    kind: one_active
    items: [left]
root: shell
        "#;
        assert_rejected(conf_str, "conducting itself");
    }

    #[test]
    fn test_valid_step_item() {
        init_log();
        let conf_str = r#"
conductors:
  - id: shell
    kind: one_active
root: shell
steps:
  - action: activate_item
        "#;
        assert_rejected(conf_str, "needs an item");

        let conf_str = r#"
conductors:
  - id: shell
    kind: one_active
root: shell
steps:
  - action: activate
    target: nowhere
        "#;
        assert_rejected(conf_str, "unknown unit nowhere");
    }

    #[test]
    fn test_valid_log_path() {
        init_log();
        let conf_str = r#"
log:
  path: ""
conductors:
  - id: shell
    kind: single
root: shell
        "#;
        assert!(matches!(
            Config::from_yaml(conf_str),
            Err(crate::core::ScreenError::Validation(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        init_log();
        let result = Config::load_from_yaml("/nonexistent/conductor.yaml");
        assert!(matches!(
            result,
            Err(crate::core::ScreenError::Configuration(_))
        ));
    }
}
