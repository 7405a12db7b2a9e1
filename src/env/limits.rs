//! Resource limiting for guest code.

use std::cell::Cell;
use std::rc::Rc;

use mlua::{HookTriggers, Lua};
use thiserror::Error;

use crate::env::config::EnvConfig;
use crate::error::{ExtError, Result};

/// Number of instructions between budget checks.
pub const INSTRUCTION_HOOK_INTERVAL: u32 = 1_000;

/// Instruction allowance charged from the runtime's count hook.
#[derive(Debug)]
pub struct InstructionBudget {
    /// Maximum instructions per pass.
    limit: u64,
    /// Instructions charged so far this pass.
    consumed: Cell<u64>,
    /// Whether the limit has been exceeded this pass.
    exhausted: Cell<bool>,
}

impl InstructionBudget {
    /// A fresh budget of `limit` instructions.
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            consumed: Cell::new(0),
            exhausted: Cell::new(false),
        }
    }

    /// Charge `instructions`, returning false once the limit is exceeded.
    pub fn charge(&self, instructions: u64) -> bool {
        let consumed = self.consumed.get().saturating_add(instructions);
        self.consumed.set(consumed);
        if consumed > self.limit {
            self.exhausted.set(true);
        }
        !self.exhausted.get()
    }

    /// Instructions charged this pass.
    pub fn consumed(&self) -> u64 {
        self.consumed.get()
    }

    /// Maximum instructions per pass.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Whether the limit has been exceeded this pass.
    pub fn exhausted(&self) -> bool {
        self.exhausted.get()
    }

    /// Start a fresh allowance.
    pub fn reset(&self) {
        self.consumed.set(0);
        self.exhausted.set(false);
    }
}

/// Raised from the count hook once the budget is spent.
#[derive(Debug, Error)]
#[error("instruction limit exceeded after {consumed} instructions")]
pub(crate) struct BudgetExhausted {
    consumed: u64,
}

/// Apply the configured memory and instruction limits to `lua`.
///
/// Returns the instruction budget if one was installed. Only the main thread is
/// metered; code running inside a coroutine is not charged.
pub(crate) fn apply_limits(lua: &Lua, config: &EnvConfig) -> Result<Option<Rc<InstructionBudget>>> {
    if let Some(bytes) = config.max_memory.limit() {
        lua.set_memory_limit(bytes).map_err(ExtError::RuntimeInit)?;
    }

    let Some(limit) = config.instruction_limit.limit() else {
        return Ok(None);
    };
    let budget = Rc::new(InstructionBudget::new(limit));
    arm(lua, &budget);
    Ok(Some(budget))
}

/// Install the count hook at its regular interval.
pub(crate) fn arm(lua: &Lua, budget: &Rc<InstructionBudget>) {
    install_hook(lua, Rc::clone(budget), INSTRUCTION_HOOK_INTERVAL);
}

fn install_hook(lua: &Lua, budget: Rc<InstructionBudget>, interval: u32) {
    lua.set_hook(
        HookTriggers {
            every_nth_instruction: Some(interval),
            ..Default::default()
        },
        move |lua, _| {
            if budget.charge(u64::from(interval)) {
                return Ok(());
            }
            // A spent budget fails every instruction, so an error caught by
            // `pcall` is raised again in the caller.
            if interval > 1 {
                install_hook(lua, Rc::clone(&budget), 1);
            }
            Err(mlua::Error::external(BudgetExhausted {
                consumed: budget.consumed(),
            }))
        },
    );
}

/// Map an error escaping guest code onto the limit it tripped, if any.
pub(crate) fn classify(err: mlua::Error) -> ExtError {
    match root_cause(&err) {
        mlua::Error::MemoryError(message) => ExtError::MemoryLimitExceeded(message.clone()),
        mlua::Error::ExternalError(inner) => match inner.downcast_ref::<BudgetExhausted>() {
            Some(hit) => ExtError::InstructionLimitExceeded {
                consumed: hit.consumed,
            },
            None => ExtError::Script(err),
        },
        _ => ExtError::Script(err),
    }
}

fn root_cause(err: &mlua::Error) -> &mlua::Error {
    match err {
        mlua::Error::CallbackError { cause, .. } => root_cause(cause),
        mlua::Error::WithContext { cause, .. } => root_cause(cause),
        other => other,
    }
}
