//! Local simulation abstraction.

pub mod step;

use std::sync::Arc;

use fnv::FnvHashMap;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::entity::{BoundFunction, CompBag, Entity, Store};
use crate::error::{Error, Result};
use crate::ir::{IrChoicePoint, IrModule, IrSourceFile};
use crate::machine::{self, Context};
use crate::model::SimModel;
use crate::timeline::{ScheduleOptions, ScheduledEvent, Timeline};
use crate::value::Value;
use crate::{EntityId, EventName, EventUid, Float, DEFAULT_STEP_BATCH};

/// Per-step callback registered by a presentation layer.
pub type StepCallback = Box<dyn FnMut(&StepNotification)>;
/// Debug-mode callback wrapping individual rule firings.
pub type DebugCallback = Box<dyn FnMut(&DebugNotification)>;

/// Local simulation instance object.
///
/// The main abstraction provided by the library. A `Sim` is assembled
/// from a compiled IR module and owns every subsystem for its lifetime:
/// the runtime model, the entity store, the timeline and the random
/// number generator. All state mutation happens on the thread calling
/// [`Sim::step`] or one of the run loops; the facade is not thread-safe
/// and does not try to be.
///
/// # Loading
///
/// A `Sim` is built from an IR module exactly once. Loading a new
/// module means constructing a new `Sim` and dropping the old one;
/// there is no in-place reload.
///
/// # Example
///
/// ```ignore
/// let mut sim = Sim::from_json_str(&ir_text).unwrap().with_seed(7);
/// sim.schedule_event("Tick", 0.0, None);
/// while sim.step().unwrap().is_some() {}
/// ```
pub struct Sim {
    /// Immutable runtime model the instance was built from.
    pub model: SimModel,
    /// All entities that exist within the simulation world.
    pub store: Store,
    /// Ordered queue of pending events.
    pub timeline: Timeline,

    rng: StdRng,
    steps: u64,
    debug: bool,
    step_observers: Vec<StepCallback>,
    debug_observers: Vec<DebugCallback>,
}

/// Payload of the per-step notification and of the step report.
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub id: EventUid,
    pub event_type: EventName,
    pub time: Float,
    pub source: Option<EntityId>,
    pub target: Option<EntityId>,
    pub fields: IndexMap<String, Value>,
}

impl From<&ScheduledEvent> for EventSummary {
    fn from(event: &ScheduledEvent) -> Self {
        EventSummary {
            id: event.id,
            event_type: event.event_type.clone(),
            time: event.time,
            source: event.source,
            target: event.target,
            fields: event.fields.clone(),
        }
    }
}

/// Descriptor returned by a successful [`Sim::step`].
#[derive(Debug, Clone)]
pub struct StepReport {
    pub event: EventSummary,
    pub time: Float,
}

/// Payload delivered to step observers, including failed steps.
#[derive(Debug, Clone, Serialize)]
pub struct StepNotification {
    pub event: EventSummary,
    pub time: Float,
    pub error: Option<String>,
}

/// Payload delivered to debug observers around each rule firing.
#[derive(Debug, Clone, Serialize)]
pub enum DebugNotification {
    RuleStart {
        rule: RuleRef,
        event: EventRef,
        source_location: Option<String>,
    },
    RuleEnd {
        rule: RuleRef,
        event: EventRef,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleRef {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventRef {
    pub id: EventUid,
    pub event_type: EventName,
}

/// Command returned by the cooperative yield hook of [`Sim::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCommand {
    /// Process the next batch.
    Continue,
    /// Hold; the hook is invoked again (the host paces the wait).
    Pause,
    /// Leave the run loop.
    Stop,
}

/// Options of the batched driver loop.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Events processed between cooperative yields.
    pub batch_size: u32,
    /// Overall step cap for the run, if any.
    pub max_steps: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            batch_size: DEFAULT_STEP_BATCH,
            max_steps: None,
        }
    }
}

/// Construction.
impl Sim {
    /// Assembles a simulation instance from a compiled IR module:
    /// validates it, registers component schemas on the store, indexes
    /// rules by trigger event, creates the initial entities with their
    /// explicit ids and attaches bound choice functions.
    pub fn from_ir(ir: &IrModule) -> Result<Sim> {
        ir.validate()?;
        let model = SimModel::from_ir(ir)?;

        let mut store = Store::new();
        for comp in &model.components {
            let mut defaults = CompBag::new();
            let mut types = FnvHashMap::default();
            for field in &comp.fields {
                defaults.insert(field.name.clone(), field.default.clone());
                types.insert(field.name.clone(), field.type_);
            }
            store.set_component_defaults(&comp.name, defaults);
            store.set_component_field_types(&comp.name, types);
        }

        if let Some(initial) = &ir.initial_state {
            for ir_ent in &initial.entities {
                store.create_entity_with_id(ir_ent.id)?;
                for (comp_name, fields) in &ir_ent.components {
                    let bag: CompBag = fields
                        .iter()
                        .map(|(name, json)| (name.clone(), Value::from_json(json)))
                        .collect();
                    store.add_component(ir_ent.id, comp_name, bag)?;
                }
                if let Some(functions) = &ir_ent.bound_functions {
                    for (name, ir_function) in functions {
                        store.bind_function(
                            ir_ent.id,
                            name,
                            Arc::new(BoundFunction::from_ir(ir_function)),
                        )?;
                    }
                }
            }
        }

        Ok(Sim {
            model,
            store,
            timeline: Timeline::new(),
            rng: StdRng::seed_from_u64(0),
            steps: 0,
            debug: false,
            step_observers: Vec::new(),
            debug_observers: Vec::new(),
        })
    }

    /// Parses and assembles from IR JSON text.
    pub fn from_json_str(input: &str) -> Result<Sim> {
        let ir = IrModule::from_json_str(input)?;
        Sim::from_ir(&ir)
    }

    /// Reseeds the facade-owned random number generator.
    pub fn with_seed(mut self, seed: u64) -> Sim {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Enables wrapping every rule firing in `rule_start`/`rule_end`
    /// debug notifications.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }
}

/// Scheduling pass-throughs.
impl Sim {
    pub fn schedule_event(
        &mut self,
        event_type: &str,
        delay: Float,
        fields: Option<IndexMap<String, Value>>,
    ) -> EventUid {
        self.timeline.schedule(
            event_type,
            delay,
            ScheduleOptions {
                fields: fields.unwrap_or_default(),
                ..Default::default()
            },
        )
    }

    pub fn schedule_recurring_event(
        &mut self,
        event_type: &str,
        interval: Float,
        options: ScheduleOptions,
    ) -> EventUid {
        self.timeline
            .schedule_recurring(event_type, interval, 0.0, options)
    }

    pub fn cancel_event(&mut self, id: EventUid) -> bool {
        self.timeline.cancel(id)
    }
}

/// Stepping.
impl Sim {
    /// Processes exactly one scheduled event: pops it, dispatches the
    /// matching rules and notifies step observers. Returns `Ok(None)`
    /// when the timeline is empty.
    ///
    /// A failing rule aborts the remainder of its firing but mutations
    /// already committed stay in place; the error carries the rule and
    /// event for diagnostics and the same message reaches the step
    /// observers.
    pub fn step(&mut self) -> Result<Option<StepReport>> {
        let event = match self.timeline.pop() {
            Some(event) => event,
            None => return Ok(None),
        };
        let summary = EventSummary::from(&event);
        let time = self.timeline.now();

        // observers are parked aside so rule execution can borrow the
        // rest of the facade mutably
        let mut debug_observers = std::mem::take(&mut self.debug_observers);
        let result = step::dispatch_event(
            &self.model,
            &mut self.store,
            &mut self.timeline,
            &mut self.rng,
            &event,
            self.debug,
            &mut debug_observers,
        );
        self.debug_observers = debug_observers;
        self.steps += 1;

        let notification = StepNotification {
            event: summary.clone(),
            time,
            error: result.as_ref().err().map(|e| e.to_string()),
        };
        let mut observers = std::mem::take(&mut self.step_observers);
        for observer in observers.iter_mut() {
            observer(&notification);
        }
        self.step_observers = observers;

        match result {
            Ok(()) => Ok(Some(StepReport {
                event: summary,
                time,
            })),
            Err(e) => {
                error!("step failed: {}", e);
                Err(Error::Machine(e))
            }
        }
    }

    /// Steps until the timeline drains or the cap is reached. Returns
    /// the number of steps executed.
    pub fn run_until_complete(&mut self, max_steps: u64) -> Result<u64> {
        let mut executed = 0;
        while executed < max_steps {
            match self.step()? {
                Some(_) => executed += 1,
                None => break,
            }
        }
        Ok(executed)
    }

    /// Cooperative batched driver. Processes `batch_size` events, then
    /// invokes the yield hook so an enclosing UI runtime can service
    /// input and rendering; the hook's command resumes, holds or ends
    /// the loop. Between yields nothing else may touch the facade. The
    /// pure [`Sim::step`] never suspends; this loop is the only place
    /// any pacing happens, and the pacing itself lives in the hook.
    pub fn run<F>(&mut self, options: RunOptions, mut yield_fn: F) -> Result<u64>
    where
        F: FnMut(&Sim) -> DriverCommand,
    {
        let batch = options.batch_size.max(1);
        let mut total = 0u64;
        'outer: loop {
            for _ in 0..batch {
                if let Some(cap) = options.max_steps {
                    if total >= cap {
                        break 'outer;
                    }
                }
                match self.step()? {
                    Some(_) => total += 1,
                    None => break 'outer,
                }
            }
            loop {
                match yield_fn(self) {
                    DriverCommand::Continue => break,
                    DriverCommand::Pause => continue,
                    DriverCommand::Stop => break 'outer,
                }
            }
        }
        Ok(total)
    }
}

/// Query helpers for presentation layers. All reads are synchronous
/// snapshots of the current state between steps.
impl Sim {
    pub fn get_component(&self, id: EntityId, comp: &str) -> Option<&CompBag> {
        self.store.get_component(id, comp)
    }
    pub fn get_field(&self, id: EntityId, comp: &str, field: &str) -> Option<&Value> {
        self.store.get_field(id, comp, field)
    }
    /// All live entity ids in insertion order.
    pub fn get_entities(&self) -> Vec<EntityId> {
        self.store.entity_ids()
    }
    pub fn query<S: AsRef<str>>(&self, comps: &[S]) -> Vec<EntityId> {
        self.store.query(comps)
    }
    pub fn get_bound_function(&self, id: EntityId, name: &str) -> Option<Arc<BoundFunction>> {
        self.store.get_bound_function(id, name)
    }
    /// Current logical time in fractional seconds.
    pub fn get_time(&self) -> Float {
        self.timeline.now()
    }
    pub fn has_events(&self) -> bool {
        self.timeline.has_events()
    }
    /// Number of steps processed so far.
    pub fn get_clock(&self) -> u64 {
        self.steps
    }
    /// Deep copy of the whole store, for debugging and testing.
    pub fn snapshot(&self) -> IndexMap<EntityId, Entity> {
        self.store.snapshot()
    }
    /// Choice-point metadata carried from the IR for UI layers.
    pub fn choice_points(&self) -> &[IrChoicePoint] {
        &self.model.choice_points
    }
    /// Surface source files, when the IR was compiled with a source map.
    pub fn source_files(&self) -> &[IrSourceFile] {
        self.model
            .source_map
            .as_ref()
            .map(|m| m.files.as_slice())
            .unwrap_or(&[])
    }

    /// Invokes a choice function bound to an entity directly, outside
    /// any rule. Intended for presentation layers between steps.
    pub fn call_bound(
        &mut self,
        entity: EntityId,
        function: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        let bound = self.store.get_bound_function(entity, function).ok_or_else(|| {
            machine::Error::new(machine::ErrorKind::UnknownBoundFunction(
                entity,
                function.to_string(),
            ))
        })?;
        let mut ctx = Context::new(&self.model, &mut self.rng);
        machine::eval::call_bound(&bound, function, args, &mut ctx, &self.store)
            .map_err(Error::Machine)
    }
}

/// Subscriptions. Callbacks are invoked synchronously and must not
/// outlive the facade.
impl Sim {
    pub fn on_step<F>(&mut self, callback: F)
    where
        F: FnMut(&StepNotification) + 'static,
    {
        self.step_observers.push(Box::new(callback));
    }

    pub fn on_debug<F>(&mut self, callback: F)
    where
        F: FnMut(&DebugNotification) + 'static,
    {
        self.debug_observers.push(Box::new(callback));
    }
}

/// Shutdown.
impl Sim {
    /// Drains the timeline and clears the store. Observers stay
    /// registered but will see no further notifications.
    pub fn shutdown(&mut self) {
        self.timeline.clear();
        self.store.clear();
    }
}
