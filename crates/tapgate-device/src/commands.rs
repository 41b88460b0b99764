//! Admin commands issued by the web frontend and the chat bot.
//!
//! Commands mutate the allow list through one funnel so both entry
//! points get identical outcome messages. An outcome is never an
//! `Err`: operator mistakes (bad hex, unknown card) come back as
//! `ok: false` with the store's message, because the device keeps
//! running either way.

use serde::{Deserialize, Serialize};
use tapgate_core::{Card, Uid};
use tapgate_store::AccessStore;
use tracing::info;

/// Management operations on the allow list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AdminCommand {
    /// List all cards.
    List,
    /// Add a card, or rename it when already listed.
    Add { uid_hex: String, name: String },
    /// Add the UID of the most recent tap.
    AddLast { name: String },
    /// Remove a card.
    Remove { uid_hex: String },
    /// Change the display name of a listed card.
    SetName { uid_hex: String, name: String },
    /// Remove every card.
    ClearAll,
}

impl AdminCommand {
    /// Whether executing this command changes the allow list.
    ///
    /// Mutations queue a `cmd` snapshot for the live subscriber;
    /// queries do not.
    pub fn mutates(&self) -> bool {
        !matches!(self, AdminCommand::List)
    }
}

/// What a command did, in operator terms.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// Whether the operation took effect (or was a benign no-op).
    pub ok: bool,
    /// Operator-facing message, shown verbatim in replies and events.
    pub msg: String,
    /// The allow list after the command, sorted by hex UID.
    pub cards: Vec<Card>,
}

/// Execute `command` against the store.
///
/// `last_uid` is the UID of the most recent tap, used by
/// [`AdminCommand::AddLast`]. Re-adding a listed card without a new
/// name reports `ok` with "Already exists" — the operator's goal is
/// already met.
pub fn execute(
    store: &mut AccessStore,
    last_uid: Option<&Uid>,
    command: AdminCommand,
) -> CommandOutcome {
    let (ok, msg) = match &command {
        AdminCommand::List => (true, String::new()),
        AdminCommand::Add { uid_hex, name } => outcome_of(store.add(uid_hex, name)),
        AdminCommand::AddLast { name } => match last_uid {
            Some(uid) => outcome_of(store.add(&uid.to_hex(), name)),
            None => (false, "No last UID (tap a card first)".to_string()),
        },
        AdminCommand::Remove { uid_hex } => outcome_of(store.remove(uid_hex)),
        AdminCommand::SetName { uid_hex, name } => outcome_of(store.set_name(uid_hex, name)),
        AdminCommand::ClearAll => outcome_of(store.clear_all()),
    };

    if command.mutates() {
        info!(ok, msg = %msg, cards = store.len(), "admin command executed");
    }

    CommandOutcome {
        ok,
        msg,
        cards: store.cards(),
    }
}

/// Collapse a store result into the (ok, message) pair the operator
/// sees.
fn outcome_of(result: tapgate_store::Result<String>) -> (bool, String) {
    match result {
        Ok(msg) => (true, msg),
        Err(error) => (false, error.to_string()),
    }
}
