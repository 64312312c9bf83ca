use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::infrastructure::resilience::CircuitBreaker;
use crate::pool::{Backend, Pool};

pub struct AppState<B: Backend> {
    pub settings: Arc<Settings>,
    pub pool: Pool<B>,
    /// Breaker wrapping the backend's connect path, when enabled
    pub circuit_breaker: Option<Arc<CircuitBreaker>>,
    pub start_time: Instant,
}

impl<B: Backend> AppState<B> {
    pub fn new(settings: Settings, pool: Pool<B>) -> Self {
        Self {
            settings: Arc::new(settings),
            pool,
            circuit_breaker: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }
}

impl<B: Backend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            pool: self.pool.clone(),
            circuit_breaker: self.circuit_breaker.clone(),
            start_time: self.start_time,
        }
    }
}
