//! Scenario runner
//!
//! Builds a conductor tree from a [`Config`], drives it through the scripted
//! steps and reports what happened together with the resulting tree.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    conductor::{AllActive, CloseStrategy, Conductor, DefaultCloseStrategy, OneActive},
    config::{Action, ConductorKind, Config, ScreenConf, Step},
    config_error, hook_error,
    core::{
        Conduct, HaveActiveItem, Item, Lifecycle, LifecycleState, Screen, ScreenError,
        ScreenExt, ScreenResult, UnitId,
    },
};

/// Leaf unit whose hooks behave as its configuration says.
pub struct ScriptedScreen {
    lifecycle: Lifecycle,
    can_close: bool,
    fail_activation: bool,
}

impl ScriptedScreen {
    pub fn new(conf: &ScreenConf) -> Arc<Self> {
        Arc::new(Self {
            lifecycle: Lifecycle::new(conf.display_name.clone().unwrap_or_else(|| conf.id.clone())),
            can_close: conf.can_close,
            fail_activation: conf.fail_activation,
        })
    }
}

#[async_trait]
impl Screen for ScriptedScreen {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    async fn on_initialize(&self, _token: &CancellationToken) -> ScreenResult<()> {
        debug!("{}: initializing", self.lifecycle.display_name());
        Ok(())
    }

    async fn on_activate(&self, _token: &CancellationToken) -> ScreenResult<()> {
        if self.fail_activation {
            return Err(hook_error!(
                "{} failed to activate",
                self.lifecycle.display_name()
            ));
        }
        Ok(())
    }

    async fn can_close(&self, _token: &CancellationToken) -> ScreenResult<bool> {
        Ok(self.can_close)
    }
}

enum Unit {
    Screen(Arc<ScriptedScreen>),
    Single(Arc<Conductor>),
    OneActive(Arc<OneActive>),
    AllActive(Arc<AllActive>),
}

impl Unit {
    fn screen(&self) -> Arc<dyn Screen> {
        match self {
            Unit::Screen(screen) => screen.clone(),
            Unit::Single(conductor) => conductor.clone(),
            Unit::OneActive(conductor) => conductor.clone(),
            Unit::AllActive(conductor) => conductor.clone(),
        }
    }

    fn item(&self) -> Item {
        match self {
            Unit::Screen(screen) => Item::screen(screen.clone()),
            Unit::Single(conductor) => Item::screen(conductor.clone()),
            Unit::OneActive(conductor) => Item::screen(conductor.clone()),
            Unit::AllActive(conductor) => Item::screen(conductor.clone()),
        }
    }

    fn conduct(&self) -> Option<Arc<dyn Conduct>> {
        match self {
            Unit::Screen(_) => None,
            Unit::Single(conductor) => Some(conductor.clone()),
            Unit::OneActive(conductor) => Some(conductor.clone()),
            Unit::AllActive(conductor) => Some(conductor.clone()),
        }
    }

    fn active_item(&self) -> Option<Item> {
        match self {
            Unit::Single(conductor) => conductor.active_item(),
            Unit::OneActive(conductor) => conductor.active_item(),
            Unit::Screen(_) | Unit::AllActive(_) => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Unit::Screen(_) => "screen",
            Unit::Single(_) => "single",
            Unit::OneActive(_) => "one_active",
            Unit::AllActive(_) => "all_active",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: String,
    pub display_name: String,
    pub kind: &'static str,
    pub state: LifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_item: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub action: Action,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    pub ok: bool,
    /// Verdict of a `can_close` step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Step outcomes plus the tree as it stands after the last step.
#[derive(Debug, Clone, Serialize)]
pub struct TreeSnapshot {
    pub steps: Vec<StepOutcome>,
    pub root: NodeSnapshot,
}

pub struct ScenarioRunner {
    units: HashMap<String, Unit>,
    ids: HashMap<UnitId, String>,
    root: String,
    steps: Vec<Step>,
}

impl ScenarioRunner {
    /// Build every declared unit and wire up conductor membership.
    ///
    /// Nothing is activated: `single` and `one_active` conductors get their
    /// first member as active item, `all_active` conductors pick their
    /// members up on initialization.
    pub async fn build(config: &Config, token: &CancellationToken) -> ScreenResult<Self> {
        info!("Building scenario...");
        let mut runner = Self {
            units: HashMap::new(),
            ids: HashMap::new(),
            root: config.root.clone(),
            steps: config.steps.clone(),
        };

        for screen in &config.screens {
            runner.build_unit(config, &screen.id)?;
        }
        for conductor in &config.conductors {
            runner.build_unit(config, &conductor.id)?;
        }

        for conf in &config.conductors {
            let Some(first) = conf.items.first() else {
                continue;
            };
            let item = runner.unit(first)?.item();
            match runner.unit(&conf.id)? {
                Unit::Single(conductor) => conductor.activate_item(item, token).await?,
                Unit::OneActive(conductor) => conductor.activate_item(item, token).await?,
                _ => {}
            }
        }

        info!(
            "Built {} unit(s) under {}, {} step(s) scripted",
            runner.units.len(),
            runner.root,
            runner.steps.len()
        );
        Ok(runner)
    }

    fn build_unit(&mut self, config: &Config, id: &str) -> ScreenResult<Item> {
        if let Some(unit) = self.units.get(id) {
            return Ok(unit.item());
        }

        let unit = match (config.screen(id), config.conductor(id)) {
            (Some(conf), _) => Unit::Screen(ScriptedScreen::new(conf)),
            (None, Some(conf)) => {
                let members = conf
                    .items
                    .iter()
                    .map(|member| self.build_unit(config, member))
                    .collect::<ScreenResult<Vec<_>>>()?;
                let strategy: Arc<dyn CloseStrategy> =
                    DefaultCloseStrategy::shared(conf.close_strategy.unwrap_or(config.close_strategy));

                let unit = match conf.kind {
                    ConductorKind::Single => Unit::Single(Conductor::with_strategy(strategy)),
                    ConductorKind::OneActive => {
                        let conductor = OneActive::with_strategy(strategy);
                        for member in members {
                            conductor.items().push(member);
                        }
                        Unit::OneActive(conductor)
                    }
                    ConductorKind::AllActive => {
                        Unit::AllActive(AllActive::with_declared(members, strategy))
                    }
                };
                let name = conf.display_name.clone().unwrap_or_else(|| conf.id.clone());
                unit.screen().lifecycle().set_display_name(name);
                unit
            }
            (None, None) => return Err(ScreenError::NotFound(id.to_string())),
        };

        let item = unit.item();
        self.ids.insert(unit.screen().lifecycle().id(), id.to_string());
        self.units.insert(id.to_string(), unit);
        Ok(item)
    }

    fn unit(&self, id: &str) -> ScreenResult<&Unit> {
        self.units
            .get(id)
            .ok_or_else(|| ScreenError::NotFound(id.to_string()))
    }

    /// Run every scripted step in order. A failing step is recorded and the
    /// scenario moves on.
    pub async fn run(&self, token: &CancellationToken) -> ScreenResult<TreeSnapshot> {
        info!("Running {} step(s)...", self.steps.len());
        let mut steps = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            let target = step.target.clone().unwrap_or_else(|| self.root.clone());
            let outcome = self.run_step(step, token).await;
            let (ok, verdict, error) = match outcome {
                Ok(verdict) => {
                    info!("step {index}: {} {target} ok", step.action);
                    (true, verdict, None)
                }
                Err(e) => {
                    warn!("step {index}: {} {target} failed: {e}", step.action);
                    (false, None, Some(e.to_string()))
                }
            };
            steps.push(StepOutcome {
                index,
                action: step.action,
                target,
                item: step.item.clone(),
                ok,
                verdict,
                error,
            });
        }

        Ok(TreeSnapshot {
            steps,
            root: self.snapshot(&self.root)?,
        })
    }

    /// Run one step. Returns the guard verdict for `can_close`, `None` for
    /// every other action.
    pub async fn run_step(&self, step: &Step, token: &CancellationToken) -> ScreenResult<Option<bool>> {
        let target_id = step.target.as_deref().unwrap_or(&self.root);
        let target = self.unit(target_id)?;

        match step.action {
            Action::Activate => target.screen().activate(token).await.map(|_| None),
            Action::Deactivate => target.screen().deactivate(false, token).await.map(|_| None),
            Action::Close => target.screen().deactivate(true, token).await.map(|_| None),
            Action::CanClose => target.screen().can_close(token).await.map(Some),
            Action::TryClose => target.screen().try_close(token).await.map(|_| None),
            Action::ActivateItem => {
                let (conductor, item) = self.item_step(target_id, target, step)?;
                conductor.activate_item(item, token).await.map(|_| None)
            }
            Action::DeactivateItem => {
                let (conductor, item) = self.item_step(target_id, target, step)?;
                conductor.deactivate_item(&item, false, token).await.map(|_| None)
            }
            Action::CloseItem => {
                let (conductor, item) = self.item_step(target_id, target, step)?;
                conductor.close_item(&item, token).await.map(|_| None)
            }
        }
    }

    fn item_step(
        &self,
        target_id: &str,
        target: &Unit,
        step: &Step,
    ) -> ScreenResult<(Arc<dyn Conduct>, Item)> {
        let conductor = target
            .conduct()
            .ok_or_else(|| config_error!("{target_id} is not a conductor"))?;
        let item_id = step
            .item
            .as_deref()
            .ok_or_else(|| config_error!("{} needs an item", step.action))?;
        Ok((conductor, self.unit(item_id)?.item()))
    }

    /// Current state of the unit `id` and everything it conducts.
    pub fn snapshot(&self, id: &str) -> ScreenResult<NodeSnapshot> {
        let unit = self.unit(id)?;
        let screen = unit.screen();
        let lifecycle = screen.lifecycle();

        let children = match unit.conduct() {
            Some(conductor) => conductor
                .children()
                .iter()
                .filter_map(|child| self.id_of(child))
                .map(|child| self.snapshot(&child))
                .collect::<ScreenResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(NodeSnapshot {
            id: id.to_string(),
            display_name: lifecycle.display_name(),
            kind: unit.kind(),
            state: lifecycle.state(),
            active_item: unit.active_item().and_then(|item| self.id_of(&item)),
            children,
        })
    }

    fn id_of(&self, item: &Item) -> Option<String> {
        item.unit_id().and_then(|id| self.ids.get(&id).cloned())
    }
}
