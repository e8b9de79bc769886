//! Error recovery across the composition tree.
//!
//! When an operation body fails with a recoverable error, the runtime walks
//! the owner chain outward from the erroring instance looking for the nearest
//! class that declares a `handle` function. The handler runs under its own
//! instance's context; success consumes the error and the original call
//! returns `Null`. A failing handler restarts the search strictly outward
//! from the handler's owner, carrying the handler's error instead.
//!
//! Which handler runs therefore depends on where the erroring instance sits
//! in the composition, not on where its class was defined. An error that
//! exhausts the chain is wrapped in an escalation marker so the operation
//! boundaries still unwinding beneath the external caller do not run the
//! same handlers a second time; the marker is stripped at the root boundary.

use serde_json::Value;

use crate::error::{CapletError, CapletResult};
use crate::id::CapsuleId;
use crate::runtime::Runtime;

impl Runtime {
    /// Run the handle search for an error raised at `origin`'s operation
    /// boundary. `Ok(Null)` means a handler consumed the error.
    pub(crate) fn propagate(
        &mut self,
        origin: CapsuleId,
        err: CapletError,
    ) -> CapletResult<Value> {
        if !err.is_recoverable() {
            return Err(err);
        }

        let mut err = err;
        let mut cursor = Some(origin);
        while let Some(cap) = cursor {
            let Some(inst) = self.instances.get(&cap) else {
                break;
            };
            let owner = inst.owner;
            let handler = inst.class.handle.clone();
            let class_name = inst.class.name.clone();
            cursor = owner;

            let Some(handler) = handler else {
                continue;
            };
            tracing::debug!(capsule = %cap, class = %class_name, error = %err, "running handler");
            self.ctx.push(cap)?;
            let outcome = handler(self, cap, &err);
            self.ctx.pop();
            match outcome {
                Ok(()) => {
                    tracing::debug!(capsule = %cap, "error handled");
                    return Ok(Value::Null);
                }
                Err(handler_err) => {
                    tracing::debug!(capsule = %cap, error = %handler_err, "handler failed");
                    if matches!(handler_err, CapletError::Escalated(_)) {
                        // A call inside the handler already walked the full
                        // chain for this error.
                        return Err(handler_err);
                    }
                    // Restart strictly outward, carrying the handler's error.
                    err = handler_err;
                }
            }
        }

        Err(CapletError::Escalated(Box::new(err)))
    }
}
