//! Mint guard: at-most-once latch for the minting tool within a run
//!
//! The agent is free to call tools in any order and any number of times. The
//! one tool that must not repeat is `mint-and-upload`. The latch flips the
//! first time a mint call is admitted (whatever the outcome) and stays set
//! for the rest of the run. A failed mint therefore leaves the run with no
//! mint rather than risking a second one.

use serde_json::{json, Value};

use crate::tools::mint::MINT_AND_UPLOAD_TOOL;

/// Error tag carried by the synthetic block payload
pub const MINTING_ALREADY_COMPLETED: &str = "MINTING_ALREADY_COMPLETED";

/// Per-run guard state, owned by the driver invocation processing the run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MintState {
    pub minting_completed: bool,
}

impl MintState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latch; never rolls back
    pub fn latch(&mut self) {
        self.minting_completed = true;
    }
}

/// Whether `tool_name` names the guarded mint tool
pub fn is_mint_action(tool_name: &str) -> bool {
    tool_name == MINT_AND_UPLOAD_TOOL
}

/// `true` iff this is a mint call and a mint was already admitted this run
pub fn should_block(tool_name: &str, state: &MintState) -> bool {
    is_mint_action(tool_name) && state.minting_completed
}

/// Output returned in place of a blocked mint call
pub fn block_payload() -> Value {
    json!({
        "success": false,
        "error": MINTING_ALREADY_COMPLETED,
    })
}
