use std::collections::HashMap;

use rand::Rng;
use tokio::sync::RwLock;

use crate::error::{QuizError, Result};

const PIN_SPACE: u32 = 1_000_000;

/// Hands out 6-digit join codes, unique among sessions that have not ended
pub struct PinRegistry {
    pins: RwLock<HashMap<String, String>>,
    max_attempts: u32,
    space: u32,
}

impl PinRegistry {
    pub fn new(max_attempts: u32) -> Self {
        Self::with_space(max_attempts, PIN_SPACE)
    }

    /// Restricts candidates to `0..space`, still rendered as six digits
    pub fn with_space(max_attempts: u32, space: u32) -> Self {
        Self {
            pins: RwLock::new(HashMap::new()),
            max_attempts: max_attempts.max(1),
            space: space.clamp(1, PIN_SPACE),
        }
    }

    fn generate_pin(&self) -> String {
        let mut rng = rand::thread_rng();
        format!("{:06}", rng.gen_range(0..self.space))
    }

    /// Binds a fresh PIN to the session
    pub async fn allocate(&self, session_id: &str) -> Result<String> {
        let mut pins = self.pins.write().await;

        for attempt in 1..=self.max_attempts {
            let pin = self.generate_pin();
            if pins.contains_key(&pin) {
                tracing::debug!(attempt, "Game PIN collision, retrying");
                continue;
            }
            pins.insert(pin.clone(), session_id.to_string());
            tracing::info!(session_id = %session_id, game_pin = %pin, "Game PIN allocated");
            return Ok(pin);
        }

        tracing::warn!(
            session_id = %session_id,
            attempts = self.max_attempts,
            active = pins.len(),
            "Game PIN allocation exhausted"
        );
        Err(QuizError::PinExhaustion {
            attempts: self.max_attempts,
        })
    }

    pub async fn resolve(&self, pin: &str) -> Result<String> {
        let pins = self.pins.read().await;
        pins.get(pin)
            .cloned()
            .ok_or_else(|| QuizError::not_found(format!("Game PIN {pin}")))
    }

    pub async fn release(&self, pin: &str) {
        let mut pins = self.pins.write().await;
        if pins.remove(pin).is_some() {
            tracing::info!(game_pin = %pin, "Game PIN released");
        } else {
            tracing::warn!(game_pin = %pin, "Released a game PIN that was not allocated");
        }
    }

    pub async fn active_count(&self) -> usize {
        self.pins.read().await.len()
    }
}
