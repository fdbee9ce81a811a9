use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Attempt, FileTransfer, TransferOutcome};
use crate::storage::models::UploadedFile;

/// Stand-in transfer that fails each file independently at a fixed rate.
pub struct SimulatedTransfer {
    initial_failure_rate: f64,
    retry_failure_rate: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedTransfer {
    /// Rates are probabilities and are clamped to `[0, 1]`.
    pub fn new(initial_failure_rate: f64, retry_failure_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            initial_failure_rate: initial_failure_rate.clamp(0.0, 1.0),
            retry_failure_rate: retry_failure_rate.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }

    fn draw_failure(&self, rate: f64) -> bool {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_bool(rate)
    }
}

#[async_trait]
impl FileTransfer for SimulatedTransfer {
    async fn transfer(&self, file: &UploadedFile, attempt: Attempt) -> TransferOutcome {
        let (rate, reason) = match attempt {
            Attempt::Initial => (self.initial_failure_rate, "Network timeout"),
            Attempt::Retry => (self.retry_failure_rate, "Persistent connection error"),
        };

        if self.draw_failure(rate) {
            tracing::trace!(file_id = %file.id, ?attempt, "Simulated transfer failure");
            TransferOutcome::Failed(reason.to_string())
        } else {
            TransferOutcome::Completed
        }
    }
}
