//! Solvers made of other solvers

use async_trait::async_trait;
use std::sync::Arc;

use super::{SolveResult, Solver, SolverContext};
use crate::events::ObjectEvent;
use crate::logging::*;

/// Runs its steps in order, stopping at the first failure
pub struct Composite {
	name: String,
	steps: Vec<Arc<dyn Solver>>,
}

impl Composite {
	pub fn new(name: impl Into<String>, steps: Vec<Arc<dyn Solver>>) -> Self {
		Composite { name: name.into(), steps }
	}
}

#[async_trait]
impl Solver for Composite {
	fn name(&self) -> &str {
		&self.name
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		for step in &self.steps {
			trace!("{}: running {}", self.name, step.name());
			step.solve(ctx, event).await?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::SolveError;
	use crate::solver::testing::Fixture;
	use std::sync::Mutex;

	struct Step {
		label: &'static str,
		fail: bool,
		log: Arc<Mutex<Vec<&'static str>>>,
	}

	#[async_trait]
	impl Solver for Step {
		fn name(&self) -> &str {
			self.label
		}

		async fn solve(&self, _ctx: &SolverContext, _event: &ObjectEvent) -> SolveResult {
			self.log.lock().unwrap().push(self.label);
			if self.fail {
				return Err(SolveError::retry("busy"));
			}
			Ok(())
		}
	}

	#[tokio::test]
	async fn test_steps_run_in_order_until_failure() {
		let fx = Fixture::new();
		let log = Arc::new(Mutex::new(Vec::new()));
		let step = |label, fail| -> Arc<dyn Solver> { Arc::new(Step { label, fail, log: log.clone() }) };
		let composite = Composite::new("abc", vec![step("a", false), step("b", true), step("c", false)]);

		let result = composite.solve(&fx.ctx, &ObjectEvent::file(None, None)).await;
		assert_eq!(result, Err(SolveError::retry("busy")));
		assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
	}
}

// vim: ts=4
