//! In-memory duplicates queue.
//!
//! Replays a fixed list of pairs with configurable misbehaviour (slow fields,
//! malformed text, selections that do not stick, merges that hang). Backs the
//! `simulate` command and the controller tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{RawRecord, UiAdapter};
use crate::error::UiError;
use crate::policy::Side;

/// One record of a scripted pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: RawRecord,
}

impl ScriptedRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: RawRecord::default(),
        }
    }

    pub fn count(mut self, text: &str) -> Self {
        self.fields.contact_count = Some(text.to_string());
        self
    }

    pub fn domain(mut self, text: &str) -> Self {
        self.fields.domain = Some(text.to_string());
        self
    }

    pub fn email(mut self, text: &str) -> Self {
        self.fields.email = Some(text.to_string());
        self
    }

    pub fn phone(mut self, text: &str) -> Self {
        self.fields.phone = Some(text.to_string());
        self
    }

    pub fn contact_type(mut self, text: &str) -> Self {
        self.fields.contact_type = Some(text.to_string());
        self
    }
}

/// How the UI misbehaves for one pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Behaviour {
    /// Extraction polls answered with "not ready" before fields appear.
    pub not_ready_polls: u32,
    /// Extraction polls that return garbled count text.
    pub malformed_polls: u32,
    /// Side marked as primary when the view opens.
    pub initial_selection: Option<Side>,
    /// Whether clicking a card actually changes the selection.
    pub selection_sticks: bool,
    pub open_fails: bool,
    pub merge_fails: bool,
    /// Merge never reports completion.
    pub merge_hangs: bool,
    /// The pair shows up once more at the back of the queue after it was
    /// merged or rejected.
    pub resurfaces: bool,
    /// Closing the view without a merge re-sorts the pair to the back.
    pub sinks_on_cancel: bool,
    /// Reads of the row's record names answered with "not ready" first.
    pub identity_not_ready_reads: u32,
    /// The queue is gone by the time this pair is rejected.
    pub lost_on_reject: bool,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            not_ready_polls: 0,
            malformed_polls: 0,
            initial_selection: Some(Side::Left),
            selection_sticks: true,
            open_fails: false,
            merge_fails: false,
            merge_hangs: false,
            resurfaces: false,
            sinks_on_cancel: false,
            identity_not_ready_reads: 0,
            lost_on_reject: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedPair {
    pub left: ScriptedRecord,
    pub right: ScriptedRecord,
    #[serde(default)]
    pub behaviour: Behaviour,
}

impl ScriptedPair {
    pub fn new(left: ScriptedRecord, right: ScriptedRecord) -> Self {
        Self {
            left,
            right,
            behaviour: Behaviour::default(),
        }
    }

    pub fn with_behaviour(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }
}

/// Something the scripted UI was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Opened(usize),
    Selected(usize, Side),
    Merged(usize, Side),
    Rejected(usize),
    Cancelled(usize),
    Refreshed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedRow(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedModal(pub usize);

#[derive(Debug)]
struct SlotState {
    pair: ScriptedPair,
    polls: u32,
    identity_reads: u32,
    selection: Option<Side>,
}

#[derive(Debug, Default)]
struct QueueState {
    slots: Vec<SlotState>,
    order: VecDeque<usize>,
    events: Vec<UiEvent>,
    locates: usize,
    /// Row lookups and refreshes still to answer with "not ready".
    flaky_locates: u32,
    flaky_refreshes: u32,
}

/// Fixture file layout for `mergepilot simulate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    pub pairs: Vec<ScriptedPair>,
    /// Report the queue as gone after this many row lookups.
    #[serde(default)]
    pub unavailable_after: Option<usize>,
}

/// A scripted duplicates queue.
#[derive(Debug)]
pub struct ScriptedQueue {
    state: Mutex<QueueState>,
    unavailable_after: Option<usize>,
}

impl ScriptedQueue {
    pub fn new(pairs: Vec<ScriptedPair>) -> Self {
        let slots: Vec<SlotState> = pairs
            .into_iter()
            .map(|pair| SlotState {
                selection: pair.behaviour.initial_selection,
                pair,
                polls: 0,
                identity_reads: 0,
            })
            .collect();
        let order = (0..slots.len()).collect();
        Self {
            state: Mutex::new(QueueState {
                slots,
                order,
                ..Default::default()
            }),
            unavailable_after: None,
        }
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        let mut queue = Self::new(fixture.pairs);
        queue.unavailable_after = fixture.unavailable_after;
        queue
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        Ok(Self::from_fixture(serde_json::from_str(json)?))
    }

    /// Fail every row lookup after `locates` successful ones.
    pub fn unavailable_after(mut self, locates: usize) -> Self {
        self.unavailable_after = Some(locates);
        self
    }

    /// Answer the first `count` row lookups with "not ready".
    pub fn flaky_locates(self, count: u32) -> Self {
        self.lock().flaky_locates = count;
        self
    }

    /// Answer the first `count` refreshes with "not ready".
    pub fn flaky_refreshes(self, count: u32) -> Self {
        self.lock().flaky_refreshes = count;
        self
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.lock().events.clone()
    }

    /// Slots that were merged, with the side kept.
    pub fn merged(&self) -> Vec<(usize, Side)> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                UiEvent::Merged(slot, side) => Some((*slot, *side)),
                _ => None,
            })
            .collect()
    }

    pub fn opened_count(&self, slot: usize) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| **e == UiEvent::Opened(slot))
            .count()
    }

    pub fn remaining(&self) -> usize {
        self.lock().order.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // A panic while holding the lock only happens in a failing test.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take a pair out of the queue, or move it to the back if it resurfaces.
    fn settle(state: &mut QueueState, slot: usize) {
        state.order.retain(|s| *s != slot);
        let behaviour = &mut state.slots[slot].pair.behaviour;
        if behaviour.resurfaces {
            behaviour.resurfaces = false;
            state.order.push_back(slot);
        }
    }
}

#[async_trait]
impl UiAdapter for ScriptedQueue {
    type Row = ScriptedRow;
    type Modal = ScriptedModal;

    fn name(&self) -> &str {
        "scripted"
    }

    async fn count_pending(&self) -> Result<usize, UiError> {
        Ok(self.lock().order.len())
    }

    async fn locate_next_row(&self, offset: usize) -> Result<Option<ScriptedRow>, UiError> {
        let mut state = self.lock();
        if let Some(limit) = self.unavailable_after {
            if state.locates >= limit {
                return Err(UiError::QueueUnavailable("scripted queue closed".into()));
            }
        }
        state.locates += 1;
        if state.flaky_locates > 0 {
            state.flaky_locates -= 1;
            return Err(UiError::NotReady("queue rows".into()));
        }
        Ok(state.order.get(offset).copied().map(ScriptedRow))
    }

    async fn extract_pair_identity(&self, row: &ScriptedRow) -> Result<(String, String), UiError> {
        let mut state = self.lock();
        let slot = &mut state.slots[row.0];
        slot.identity_reads = slot.identity_reads.saturating_add(1);
        if slot.identity_reads <= slot.pair.behaviour.identity_not_ready_reads {
            return Err(UiError::NotReady("row record names".into()));
        }
        Ok((slot.pair.left.id.clone(), slot.pair.right.id.clone()))
    }

    async fn open_comparison(&self, row: &ScriptedRow) -> Result<ScriptedModal, UiError> {
        let mut state = self.lock();
        let slot = &mut state.slots[row.0];
        if slot.pair.behaviour.open_fails {
            return Err(UiError::Action("comparison view did not open".into()));
        }
        slot.polls = 0;
        slot.selection = slot.pair.behaviour.initial_selection;
        state.events.push(UiEvent::Opened(row.0));
        Ok(ScriptedModal(row.0))
    }

    async fn extract_attributes(&self, modal: &ScriptedModal, side: Side) -> Result<RawRecord, UiError> {
        let mut state = self.lock();
        let slot = &mut state.slots[modal.0];
        // Both sides are read per attempt; count polls on the left read only.
        if side == Side::Left {
            slot.polls += 1;
        }
        let behaviour = &slot.pair.behaviour;
        if slot.polls <= behaviour.not_ready_polls {
            return Err(UiError::NotReady(format!("{side} record fields")));
        }
        let record = match side {
            Side::Left => &slot.pair.left,
            Side::Right => &slot.pair.right,
        };
        let mut fields = record.fields.clone();
        fields.name.get_or_insert_with(|| record.id.clone());
        if slot.polls <= behaviour.not_ready_polls.saturating_add(behaviour.malformed_polls) {
            fields.contact_count = Some("Loading…".into());
        }
        Ok(fields)
    }

    async fn current_selection(&self, modal: &ScriptedModal) -> Result<Option<Side>, UiError> {
        Ok(self.lock().slots[modal.0].selection)
    }

    async fn set_selection(&self, modal: &ScriptedModal, side: Side) -> Result<(), UiError> {
        let mut state = self.lock();
        let slot = &mut state.slots[modal.0];
        if slot.pair.behaviour.selection_sticks {
            slot.selection = Some(side);
        }
        state.events.push(UiEvent::Selected(modal.0, side));
        Ok(())
    }

    async fn confirm_merge(&self, modal: &ScriptedModal) -> Result<(), UiError> {
        let hangs = {
            let mut state = self.lock();
            let slot = &state.slots[modal.0];
            let (fails, hangs) = (slot.pair.behaviour.merge_fails, slot.pair.behaviour.merge_hangs);
            let side = slot.selection.unwrap_or(Side::Left);
            if fails {
                return Err(UiError::Action("merge button disabled".into()));
            }
            if !hangs {
                state.events.push(UiEvent::Merged(modal.0, side));
                Self::settle(&mut state, modal.0);
            }
            hangs
        };
        if hangs {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn reject(&self, row: &ScriptedRow) -> Result<(), UiError> {
        let mut state = self.lock();
        if state.slots[row.0].pair.behaviour.lost_on_reject {
            return Err(UiError::QueueUnavailable("queue closed while rejecting".into()));
        }
        state.events.push(UiEvent::Rejected(row.0));
        Self::settle(&mut state, row.0);
        Ok(())
    }

    async fn cancel(&self, modal: &ScriptedModal) -> Result<(), UiError> {
        let mut state = self.lock();
        state.events.push(UiEvent::Cancelled(modal.0));
        if state.slots[modal.0].pair.behaviour.sinks_on_cancel {
            state.order.retain(|s| *s != modal.0);
            state.order.push_back(modal.0);
        }
        Ok(())
    }

    async fn refresh_queue(&self) -> Result<(), UiError> {
        let mut state = self.lock();
        if state.flaky_refreshes > 0 {
            state.flaky_refreshes -= 1;
            return Err(UiError::NotReady("queue reload".into()));
        }
        state.events.push(UiEvent::Refreshed);
        Ok(())
    }
}
