//! System attachment bookkeeping.
//!
//! A system is a named set of callbacks invoked for each attached entity.
//! Attach/detach requests land in staging lists and are applied between
//! ticks; the tick itself only reads a snapshot, so entity jobs can run in
//! parallel without the lists shifting underneath them.

use std::fmt;
use std::sync::Arc;

use crate::id::UniqueId;
use crate::state::{GameInterface, ObjectRef};
use crate::time::{TimeDuration, TimePoint};

/// Everything a system callback gets about one entity for one tick.
pub struct SystemJobData {
    pub entity: ObjectRef,
    pub system: UniqueId,
    pub interface: Arc<GameInterface>,
    pub time: TimePoint,
    pub dt: TimeDuration,
}

/// A system callback. Errors are caught at the job boundary and logged.
pub type SystemFn = fn(&SystemJobData) -> Result<(), String>;

/// Callback set for a game system.
#[derive(Clone, Copy, Default)]
pub struct SystemBehaviour {
    pub on_create: Option<SystemFn>,
    pub on_connect: Option<SystemFn>,
    pub on_disconnect: Option<SystemFn>,
    pub tick: Option<SystemFn>,
    pub on_destroy: Option<SystemFn>,
}

impl fmt::Debug for SystemBehaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemBehaviour")
            .field("on_create", &self.on_create.is_some())
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("tick", &self.tick.is_some())
            .field("on_destroy", &self.on_destroy.is_some())
            .finish()
    }
}

/// Callback set for a render-side system. The job data lives in
/// [`crate::render`]; render systems run on the render thread only.
#[derive(Clone, Copy, Default)]
pub struct RenderBehaviour {
    pub on_create: Option<crate::render::RenderFn>,
    pub tick: Option<crate::render::RenderFn>,
    pub on_destroy: Option<crate::render::RenderFn>,
}

impl fmt::Debug for RenderBehaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderBehaviour")
            .field("on_create", &self.on_create.is_some())
            .field("tick", &self.tick.is_some())
            .field("on_destroy", &self.on_destroy.is_some())
            .finish()
    }
}

/// A resource usable as a system declaration.
pub trait SystemResource: Clone {
    fn id(&self) -> UniqueId;
}

impl SystemResource for crate::data::resources::SystemDecl {
    fn id(&self) -> UniqueId {
        self.id
    }
}

impl SystemResource for crate::data::resources::RenderSystemDecl {
    fn id(&self) -> UniqueId {
        self.id
    }
}

/// An entity attached to a system, with the next time it wants a tick.
#[derive(Debug, Clone, Copy)]
pub struct AttachedEntity {
    pub entity: ObjectRef,
    pub next_activation: TimePoint,
}

struct Attachment<D> {
    decl: D,
    attached: Vec<AttachedEntity>,
    new_ents: Vec<AttachedEntity>,
    created_ents: Vec<AttachedEntity>,
    removed_ents: Vec<AttachedEntity>,
}

/// One system's due work for a tick, taken from a snapshot.
pub struct TickWork<D> {
    pub decl: D,
    pub entities: Vec<AttachedEntity>,
}

/// Staged connect/create/disconnect callbacks for the end of a tick.
pub struct PendingEvents<D> {
    pub decl: D,
    pub connected: Vec<AttachedEntity>,
    pub created: Vec<AttachedEntity>,
    pub disconnected: Vec<AttachedEntity>,
}

/// Attachment table for every active system of one level.
pub struct SystemBehaviours<D: SystemResource> {
    entries: Vec<Attachment<D>>,
}

impl<D: SystemResource> Default for SystemBehaviours<D> {
    fn default() -> Self {
        SystemBehaviours {
            entries: Vec::new(),
        }
    }
}

impl<D: SystemResource> SystemBehaviours<D> {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_mut(&mut self, decl: &D) -> &mut Attachment<D> {
        let id = decl.id();
        if let Some(index) = self.entries.iter().position(|e| e.decl.id() == id) {
            return &mut self.entries[index];
        }
        self.entries.push(Attachment {
            decl: decl.clone(),
            attached: Vec::new(),
            new_ents: Vec::new(),
            created_ents: Vec::new(),
            removed_ents: Vec::new(),
        });
        self.entries.last_mut().unwrap()
    }

    /// Stage an attachment, effective at the end of the current tick.
    /// `created` marks entities that were just made, which additionally get
    /// the `on_create` callback.
    pub fn attach(&mut self, decl: &D, entity: ObjectRef, at: TimePoint, created: bool) {
        let entry = self.entry_mut(decl);
        let attached = AttachedEntity {
            entity,
            next_activation: at,
        };
        entry.new_ents.push(attached);
        if created {
            entry.created_ents.push(attached);
        }
    }

    /// Stage a detachment, effective at the end of the current tick.
    pub fn detach(&mut self, system: UniqueId, entity: ObjectRef) {
        let Some(entry) = self.entries.iter_mut().find(|e| e.decl.id() == system) else {
            return;
        };
        if let Some(index) = entry.attached.iter().position(|a| a.entity.id == entity.id) {
            let attached = entry.attached.remove(index);
            entry.removed_ents.push(attached);
        } else {
            // not attached yet; cancel a staged attach instead
            entry.new_ents.retain(|a| a.entity.id != entity.id);
        }
    }

    /// Detach `entity` from every system.
    pub fn detach_all(&mut self, entity: ObjectRef) {
        let systems: Vec<UniqueId> = self.entries.iter().map(|e| e.decl.id()).collect();
        for system in systems {
            self.detach(system, entity);
        }
    }

    /// The entities due to tick at `now`, per system. The caller holds the
    /// system-list lock only long enough to take this snapshot.
    pub fn snapshot(&self, now: TimePoint) -> Vec<TickWork<D>> {
        self.entries
            .iter()
            .map(|entry| TickWork {
                decl: entry.decl.clone(),
                entities: entry
                    .attached
                    .iter()
                    .filter(|a| a.next_activation <= now)
                    .copied()
                    .collect(),
            })
            .collect()
    }

    /// Drain the staging lists: merge new attachments into the attached
    /// list and return the callback work.
    pub fn apply_pending(&mut self) -> Vec<PendingEvents<D>> {
        let mut out = Vec::new();
        for entry in &mut self.entries {
            if entry.new_ents.is_empty()
                && entry.created_ents.is_empty()
                && entry.removed_ents.is_empty()
            {
                continue;
            }
            let connected = std::mem::take(&mut entry.new_ents);
            let created = std::mem::take(&mut entry.created_ents);
            let disconnected = std::mem::take(&mut entry.removed_ents);
            entry.attached.extend(connected.iter().copied());
            out.push(PendingEvents {
                decl: entry.decl.clone(),
                connected,
                created,
                disconnected,
            });
        }
        out
    }

    pub fn systems(&self) -> impl Iterator<Item = &D> {
        self.entries.iter().map(|e| &e.decl)
    }

    /// Attached entities of one system (staged attaches excluded).
    pub fn attached(&self, system: UniqueId) -> Vec<AttachedEntity> {
        self.entries
            .iter()
            .find(|e| e.decl.id() == system)
            .map(|e| e.attached.clone())
            .unwrap_or_default()
    }
}
