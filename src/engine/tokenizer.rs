//! Tokenizer adapter over the engine vocabulary.
//!
//! Text becomes token ids; token ids become raw byte fragments. Fragments
//! may split multi-byte characters and are not validated here.

use super::error::SessionError;
use super::{BufferError, ModelHandle, TokenId};

/// First-attempt buffer size for a single token piece.
pub const PIECE_BUFFER_BYTES: usize = 8;

/// Borrowing adapter that owns the buffer policy for engine tokenization calls.
pub struct Tokenizer<'a, M> {
    model: &'a M,
}

impl<'a, M: ModelHandle> Tokenizer<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self { model }
    }

    /// Tokenize `text`, optionally prefixed with the BOS marker.
    ///
    /// The buffer is sized to an upper bound of one token per byte plus the
    /// marker; if the engine still reports a shortfall the call is retried
    /// once at the size it asks for.
    pub fn encode(&self, text: &str, add_bos: bool) -> Result<Vec<TokenId>, SessionError> {
        let upper_bound = text.len() + usize::from(add_bos);
        let mut tokens = vec![0; upper_bound];
        let count = match self.model.tokenize(text, add_bos, &mut tokens) {
            Ok(n) => n,
            Err(BufferError::TooSmall { required }) => {
                tracing::debug!(upper_bound, required, "token buffer undersized, retrying");
                tokens = vec![0; required];
                self.model
                    .tokenize(text, add_bos, &mut tokens)
                    .map_err(|e| SessionError::Tokenize(e.to_string()))?
            }
            Err(e) => return Err(SessionError::Tokenize(e.to_string())),
        };
        tokens.truncate(count);
        Ok(tokens)
    }

    /// Raw bytes for one token.
    ///
    /// Tries an 8-byte buffer first, then exactly the size the engine reports.
    pub fn decode_one(&self, token: TokenId) -> Result<Vec<u8>, SessionError> {
        let mut piece = vec![0u8; PIECE_BUFFER_BYTES];
        match self.model.token_to_piece(token, &mut piece) {
            Ok(n) => {
                piece.truncate(n);
                Ok(piece)
            }
            Err(BufferError::TooSmall { required }) => {
                let mut piece = vec![0u8; required];
                match self.model.token_to_piece(token, &mut piece) {
                    Ok(n) => {
                        piece.truncate(n);
                        Ok(piece)
                    }
                    Err(BufferError::TooSmall { required }) => {
                        Err(SessionError::DecodeOverflow { token, required })
                    }
                    Err(BufferError::Engine(msg)) => Err(SessionError::Tokenize(msg)),
                }
            }
            Err(BufferError::Engine(msg)) => Err(SessionError::Tokenize(msg)),
        }
    }

    /// Concatenated raw bytes for a token sequence.
    pub fn decode_all(&self, tokens: &[TokenId]) -> Result<Vec<u8>, SessionError> {
        let mut bytes = Vec::with_capacity(tokens.len() * 2);
        for &token in tokens {
            bytes.extend_from_slice(&self.decode_one(token)?);
        }
        Ok(bytes)
    }
}
