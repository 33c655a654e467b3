//! Cluster-safe transactions and scripting.
//!
//! The cluster driver routes every command by the hash slot of its key, so a
//! plain MULTI would open a transaction on one node while the queued
//! commands land on others. [`ClusterAdapter`] intercepts the commands named
//! in its [`OverrideRegistry`]:
//!
//! - MULTI opens a client-side buffer; following commands are queued and
//!   tagged with the slots of their keys.
//! - EXEC checks that every queued key shares one slot, then sends the whole
//!   buffer as one atomic batch to the node owning it.
//! - DISCARD drops the buffer.
//! - EVAL and friends check that the declared keys share one slot before
//!   forwarding, so the driver routes the script next to its data.
//!
//! Slot disagreements fail with [`Error::CrossSlot`] before anything is sent.

use std::collections::HashMap;
use std::sync::Arc;

use redis::Value;
use tracing::debug;

use crate::crc16::key_slot;
use crate::error::{Error, Result};
use crate::router::{Command, CommandExecutor, PendingReply};

// ── Override registry ─────────────────────────────────────────────

/// Strategy applied to an intercepted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOverride {
    Multi,
    Exec,
    Discard,
    Eval,
}

/// Command name to override strategy. Filled once when a cluster connection
/// is created and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct OverrideRegistry {
    strategies: HashMap<String, CommandOverride>,
}

impl OverrideRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the transaction and scripting overrides a cluster needs.
    pub fn cluster() -> Self {
        let mut registry = Self::new();
        registry.define("MULTI", CommandOverride::Multi);
        registry.define("EXEC", CommandOverride::Exec);
        registry.define("DISCARD", CommandOverride::Discard);
        for name in ["EVAL", "EVALSHA", "EVAL_RO", "EVALSHA_RO"] {
            registry.define(name, CommandOverride::Eval);
        }
        registry
    }

    pub fn define(&mut self, name: &str, strategy: CommandOverride) {
        self.strategies.insert(name.to_ascii_uppercase(), strategy);
    }

    /// Case-insensitive lookup.
    pub fn lookup(&self, name: &str) -> Option<CommandOverride> {
        self.strategies.get(&name.to_ascii_uppercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

// ── Key extraction ────────────────────────────────────────────────

/// Keys of a command. `args` excludes the command name.
///
/// Scripts declare their keys through `numkeys`: `EVAL script numkeys key...
/// arg...`. A malformed `numkeys` is a command error.
pub fn command_keys<'a>(name: &str, args: &[&'a str]) -> Result<Vec<&'a str>> {
    let keys = match name.to_ascii_uppercase().as_str() {
        "PING" | "ECHO" | "INFO" | "DBSIZE" | "CLUSTER" | "CONFIG" | "CLIENT" | "COMMAND"
        | "TIME" | "RANDOMKEY" | "WAIT" | "SAVE" | "BGSAVE" | "BGREWRITEAOF" | "FLUSHALL"
        | "FLUSHDB" | "LASTSAVE" | "SLOWLOG" | "DEBUG" | "MULTI" | "EXEC" | "DISCARD"
        | "SCRIPT" | "PUBLISH" | "SUBSCRIBE" | "UNSUBSCRIBE" | "PSUBSCRIBE"
        | "PUNSUBSCRIBE" | "AUTH" | "SELECT" | "QUIT" => Vec::new(),
        "EVAL" | "EVALSHA" | "EVAL_RO" | "EVALSHA_RO" | "FCALL" | "FCALL_RO" => {
            return script_keys(args)
        }
        "XREAD" | "XREADGROUP" => match args.iter().position(|a| a.eq_ignore_ascii_case("STREAMS")) {
            Some(i) => {
                let streams = &args[i + 1..];
                streams[..streams.len() / 2].to_vec()
            }
            None => Vec::new(),
        },
        "DEL" | "UNLINK" | "EXISTS" | "TOUCH" | "MGET" | "WATCH" | "SINTER" | "SUNION"
        | "SDIFF" | "SINTERSTORE" | "SUNIONSTORE" | "SDIFFSTORE" | "PFCOUNT" | "PFMERGE" => {
            args.to_vec()
        }
        "RENAME" | "RENAMENX" | "RPOPLPUSH" | "SMOVE" | "LMOVE" | "BLMOVE" | "COPY" => {
            args.iter().take(2).copied().collect()
        }
        "MSET" | "MSETNX" => args.iter().step_by(2).copied().collect(),
        _ => args.first().copied().into_iter().collect(),
    };
    Ok(keys)
}

fn script_keys<'a>(args: &[&'a str]) -> Result<Vec<&'a str>> {
    let Some(raw) = args.get(1) else {
        return Err(Error::command("ERR wrong number of arguments for script call"));
    };
    let numkeys: usize = raw
        .parse()
        .map_err(|_| Error::command("ERR value is not an integer or out of range"))?;
    numkeys
        .checked_add(2)
        .and_then(|end| args.get(2..end))
        .map(|keys| keys.to_vec())
        .ok_or_else(|| Error::command("ERR Number of keys can't be greater than number of args"))
}

/// The one slot shared by `slots`, or `None` when there are no slots.
fn common_slot(command: &str, slots: impl IntoIterator<Item = u16>) -> Result<Option<u16>> {
    let mut shared = None;
    for slot in slots {
        match shared {
            None => shared = Some(slot),
            Some(first) if first != slot => {
                return Err(Error::CrossSlot {
                    command: command.to_string(),
                    first,
                    second: slot,
                })
            }
            Some(_) => {}
        }
    }
    Ok(shared)
}

fn slots_of(name: &str, args: &[&str]) -> Result<Vec<u16>> {
    Ok(command_keys(name, args)?
        .into_iter()
        .map(|k| key_slot(k.as_bytes()))
        .collect())
}

// ── Adapter ───────────────────────────────────────────────────────

struct Queued {
    command: Command,
    slots: Vec<u16>,
}

/// Executor wrapper applying cluster overrides on top of a cluster driver.
pub struct ClusterAdapter<E> {
    inner: E,
    overrides: Arc<OverrideRegistry>,
    transaction: Option<Vec<Queued>>,
}

impl<E: CommandExecutor> ClusterAdapter<E> {
    pub fn new(inner: E, overrides: Arc<OverrideRegistry>) -> Self {
        Self {
            inner,
            overrides,
            transaction: None,
        }
    }

    /// Whether a MULTI is open.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn begin(&mut self) -> Result<Value> {
        if self.transaction.is_some() {
            return Err(Error::command("ERR MULTI calls can not be nested"));
        }
        self.transaction = Some(Vec::new());
        Ok(Value::Okay)
    }

    fn discard(&mut self) -> Result<Value> {
        match self.transaction.take() {
            Some(_) => Ok(Value::Okay),
            None => Err(Error::command("ERR DISCARD without MULTI")),
        }
    }

    fn enqueue(&mut self, name: &str, args: &[&str]) -> Result<Value> {
        let slots = slots_of(name, args)?;
        if let Some(queue) = self.transaction.as_mut() {
            queue.push(Queued {
                command: Command::new(name, args),
                slots,
            });
        }
        Ok(Value::SimpleString("QUEUED".into()))
    }

    async fn exec(&mut self) -> Result<Value> {
        let queue = self
            .transaction
            .take()
            .ok_or_else(|| Error::command("ERR EXEC without MULTI"))?;
        if queue.is_empty() {
            return Ok(Value::Array(Vec::new()));
        }

        let slot = common_slot("EXEC", queue.iter().flat_map(|q| q.slots.iter().copied()))?;
        debug!(?slot, commands = queue.len(), "flushing cluster transaction");

        let commands: Vec<Command> = queue.into_iter().map(|q| q.command).collect();
        let replies = self.inner.invoke_batch(&commands, true).await?;
        Ok(Value::Array(replies))
    }

    async fn eval(&mut self, name: &str, args: &[&str]) -> Result<Value> {
        let slot = common_slot(name, slots_of(name, args)?)?;
        debug!(command = name, ?slot, "routing script");
        self.inner.invoke(name, args).await
    }
}

impl<E: CommandExecutor> CommandExecutor for ClusterAdapter<E> {
    async fn invoke(&mut self, name: &str, args: &[&str]) -> Result<Value> {
        match self.overrides.lookup(name) {
            Some(CommandOverride::Multi) => self.begin(),
            Some(CommandOverride::Exec) => self.exec().await,
            Some(CommandOverride::Discard) => self.discard(),
            _ if self.transaction.is_some() => self.enqueue(name, args),
            Some(CommandOverride::Eval) => self.eval(name, args).await,
            None => self.inner.invoke(name, args).await,
        }
    }

    async fn invoke_batch(&mut self, commands: &[Command], atomic: bool) -> Result<Vec<Value>> {
        if self.transaction.is_some() {
            let mut replies = Vec::with_capacity(commands.len());
            for command in commands {
                replies.push(self.enqueue(&command.name, &command.arg_refs())?);
            }
            return Ok(replies);
        }
        if atomic {
            let mut slots = Vec::new();
            for command in commands {
                slots.extend(slots_of(&command.name, &command.arg_refs())?);
            }
            common_slot("EXEC", slots)?;
        }
        self.inner.invoke_batch(commands, atomic).await
    }

    async fn submit(&mut self, name: &str, args: &[&str]) -> Result<PendingReply> {
        if self.transaction.is_some() || self.overrides.lookup(name).is_some() {
            let value = self.invoke(name, args).await?;
            return Ok(PendingReply::ready(value));
        }
        self.inner.submit(name, args).await
    }

    fn set_deferred(&mut self, on: bool) {
        self.inner.set_deferred(on);
    }

    fn is_reusable(&self) -> bool {
        !self.in_transaction() && self.inner.is_reusable()
    }
}

// ── Tests ──────────────────────────────────────────────────────────
