use fanout_model::{Outcome, TaskIndex};

use crate::CoreError;

/// Output collection of one run: one slot per submitted task, each written once.
#[derive(Debug)]
pub struct OutputSlots {
    slots: Vec<Option<Outcome>>,
    filled: usize,
}

impl OutputSlots {
    pub fn new(total: usize) -> Self {
        Self {
            slots: vec![None; total],
            filled: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.slots.len()
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Writes the outcome for `index`; a second write for the same index is an error.
    pub fn fill(&mut self, index: TaskIndex, outcome: Outcome) -> Result<(), CoreError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(CoreError::UnknownIndex(index))?;
        if slot.is_some() {
            return Err(CoreError::DuplicateResult(index));
        }
        *slot = Some(outcome);
        self.filled += 1;
        Ok(())
    }

    /// Consumes the collection; fails on the first slot that was never written.
    pub fn finish(self) -> Result<Vec<Outcome>, CoreError> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.ok_or(CoreError::Unaccounted(index)))
            .collect()
    }
}
