//! Fixed-capacity decode batch.
//!
//! Structure-of-arrays input for one engine decode call. A single sequence
//! (id 0) is used; only slots marked for logits produce output.

use super::error::SessionError;
use super::{ContextHandle, TokenId};

/// Sequence id used for every slot.
pub const SEQUENCE_ID: i32 = 0;

/// Per-step engine input: token, position, sequence and logits flag per slot.
#[derive(Debug, Clone)]
pub struct DecodeBatch {
    capacity: usize,
    n_tokens: usize,
    token: Vec<TokenId>,
    pos: Vec<i32>,
    seq_id: Vec<i32>,
    logits: Vec<bool>,
}

impl DecodeBatch {
    /// Allocate a batch with room for `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            n_tokens: 0,
            token: vec![0; capacity],
            pos: vec![0; capacity],
            seq_id: vec![SEQUENCE_ID; capacity],
            logits: vec![false; capacity],
        }
    }

    /// Zero the active-slot count. Slot storage is kept.
    pub fn reset(&mut self) {
        self.n_tokens = 0;
    }

    /// Write the next slot.
    pub fn append(
        &mut self,
        token: TokenId,
        position: usize,
        wants_logits: bool,
    ) -> Result<(), SessionError> {
        if self.n_tokens >= self.capacity {
            return Err(SessionError::BatchFull { capacity: self.capacity });
        }
        let pos = i32::try_from(position).map_err(|_| SessionError::ContextOverflow {
            max: i32::MAX as usize,
            got: position,
        })?;
        let i = self.n_tokens;
        self.token[i] = token;
        self.pos[i] = pos;
        self.seq_id[i] = SEQUENCE_ID;
        self.logits[i] = wants_logits;
        self.n_tokens += 1;
        Ok(())
    }

    /// Load a prompt at positions `0..N`, requesting logits only for the final slot.
    ///
    /// The batch is left empty on error.
    pub fn fill_prompt(&mut self, tokens: &[TokenId]) -> Result<(), SessionError> {
        self.reset();
        let last = tokens.len().saturating_sub(1);
        for (i, &token) in tokens.iter().enumerate() {
            if let Err(e) = self.append(token, i, i == last) {
                self.reset();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Load the single next token at `position`, requesting logits.
    pub fn fill_single(&mut self, token: TokenId, position: usize) -> Result<(), SessionError> {
        self.reset();
        self.append(token, position, true)
    }

    /// Index of the last active slot that requested logits.
    pub fn last_logits_index(&self) -> Option<usize> {
        self.logits[..self.n_tokens].iter().rposition(|&wants| wants)
    }

    /// Hand the active slots to the engine. A nonzero status is not retried.
    pub fn submit<C: ContextHandle>(&self, context: &mut C) -> Result<(), SessionError> {
        let status = context.decode(self);
        if status != 0 {
            tracing::warn!(status, n_tokens = self.n_tokens, "engine decode failed");
            return Err(SessionError::DecodeFailed { status });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.n_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.n_tokens == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn tokens(&self) -> &[TokenId] {
        &self.token[..self.n_tokens]
    }

    pub fn positions(&self) -> &[i32] {
        &self.pos[..self.n_tokens]
    }

    pub fn seq_ids(&self) -> &[i32] {
        &self.seq_id[..self.n_tokens]
    }

    pub fn logits(&self) -> &[bool] {
        &self.logits[..self.n_tokens]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_prompt_marks_only_last_slot() {
        let mut batch = DecodeBatch::new(8);
        batch.fill_prompt(&[10, 11, 12]).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.tokens(), &[10, 11, 12]);
        assert_eq!(batch.positions(), &[0, 1, 2]);
        assert_eq!(batch.seq_ids(), &[0, 0, 0]);
        assert_eq!(batch.logits(), &[false, false, true]);
        assert_eq!(batch.last_logits_index(), Some(2));
    }

    #[test]
    fn append_rejects_when_full() {
        let mut batch = DecodeBatch::new(2);
        batch.append(1, 0, false).unwrap();
        batch.append(2, 1, true).unwrap();
        let err = batch.append(3, 2, true).unwrap_err();
        assert!(matches!(err, SessionError::BatchFull { capacity: 2 }));
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn oversized_prompt_leaves_batch_empty() {
        let mut batch = DecodeBatch::new(2);
        assert!(batch.fill_prompt(&[1, 2, 3]).is_err());
        assert!(batch.is_empty());
        assert_eq!(batch.last_logits_index(), None);
    }

    #[test]
    fn fill_single_replaces_previous_contents() {
        let mut batch = DecodeBatch::new(4);
        batch.fill_prompt(&[5, 6, 7, 8]).unwrap();
        batch.fill_single(9, 4).unwrap();
        assert_eq!(batch.tokens(), &[9]);
        assert_eq!(batch.positions(), &[4]);
        assert_eq!(batch.last_logits_index(), Some(0));
    }

    #[test]
    fn last_logits_index_ignores_inactive_slots() {
        let mut batch = DecodeBatch::new(4);
        batch.fill_prompt(&[1, 2, 3, 4]).unwrap();
        batch.reset();
        batch.append(7, 4, false).unwrap();
        assert_eq!(batch.last_logits_index(), None);
    }
}
