//! Single-node command execution.
//!
//! [`Driver`] forwards commands verbatim to one driver connection. It backs
//! both standalone and sentinel topologies (a sentinel client hands back a
//! plain connection to the current primary) and, wrapped in a
//! [`ClusterAdapter`](super::ClusterAdapter), the cluster topology.

use redis::aio::ConnectionLike;
use redis::{Cmd, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::router::{Command, CommandExecutor, PendingReply};

/// Pass-through executor over a driver connection.
pub struct Driver<C> {
    conn: C,
}

impl<C> Driver<C>
where
    C: ConnectionLike + Clone + Send + 'static,
{
    pub fn new(conn: C) -> Self {
        Self { conn }
    }

    /// Authenticate and select the database. Database 0 is the server
    /// default and is not selected explicitly.
    pub async fn init(&mut self, password: Option<&str>, database: Option<i64>) -> Result<()> {
        if let Some(pass) = password {
            self.invoke("AUTH", &[pass]).await?;
        }
        if let Some(db) = database.filter(|db| *db != 0) {
            debug!(db, "selecting database");
            self.invoke("SELECT", &[&db.to_string()]).await?;
        }
        Ok(())
    }
}

fn build_cmd(name: &str, args: &[&str]) -> Cmd {
    let mut cmd = redis::cmd(name);
    for arg in args {
        cmd.arg(*arg);
    }
    cmd
}

impl<C> CommandExecutor for Driver<C>
where
    C: ConnectionLike + Clone + Send + 'static,
{
    async fn invoke(&mut self, name: &str, args: &[&str]) -> Result<Value> {
        let cmd = build_cmd(name, args);
        Ok(cmd.query_async::<Value>(&mut self.conn).await?)
    }

    async fn invoke_batch(&mut self, commands: &[Command], atomic: bool) -> Result<Vec<Value>> {
        let mut pipe = redis::pipe();
        if atomic {
            pipe.atomic();
        }
        for command in commands {
            pipe.add_command(build_cmd(&command.name, &command.arg_refs()));
        }
        Ok(pipe.query_async::<Vec<Value>>(&mut self.conn).await?)
    }

    async fn submit(&mut self, name: &str, args: &[&str]) -> Result<PendingReply> {
        let cmd = build_cmd(name, args);
        let mut conn = self.conn.clone();
        let handle = tokio::spawn(async move {
            cmd.query_async::<Value>(&mut conn)
                .await
                .map_err(Error::from)
        });
        Ok(PendingReply::in_flight(handle))
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use redis::{Arg, Pipeline, RedisFuture};
    use std::sync::Arc;

    /// Connection that records every command and answers with its name.
    #[derive(Clone, Default)]
    struct Recorder {
        log: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl Recorder {
        fn commands(&self) -> Vec<Vec<String>> {
            self.log.lock().clone()
        }
    }

    impl ConnectionLike for Recorder {
        fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
            let parts: Vec<String> = cmd
                .args_iter()
                .map(|a| match a {
                    Arg::Simple(b) => String::from_utf8_lossy(b).into_owned(),
                    Arg::Cursor => "0".to_string(),
                })
                .collect();
            let reply = Value::SimpleString(parts[0].clone());
            self.log.lock().push(parts);
            Box::pin(async move { Ok(reply) })
        }

        fn req_packed_commands<'a>(
            &'a mut self,
            _cmd: &'a Pipeline,
            _offset: usize,
            _count: usize,
        ) -> RedisFuture<'a, Vec<Value>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn get_db(&self) -> i64 {
            0
        }
    }

    #[tokio::test]
    async fn invoke_forwards_verbatim() {
        let rec = Recorder::default();
        let mut driver = Driver::new(rec.clone());

        let reply = driver.invoke("HSET", &["h", "f", "v"]).await.unwrap();
        assert_eq!(reply, Value::SimpleString("HSET".into()));
        assert_eq!(rec.commands(), vec![vec!["HSET", "h", "f", "v"]]);
    }

    #[tokio::test]
    async fn submit_replies_later() {
        let rec = Recorder::default();
        let mut driver = Driver::new(rec.clone());

        let pending = driver.submit("PING", &[]).await.unwrap();
        assert_eq!(
            pending.wait().await.unwrap(),
            Value::SimpleString("PING".into())
        );
        assert_eq!(rec.commands().len(), 1);
    }

    #[tokio::test]
    async fn init_auth_and_select() {
        let rec = Recorder::default();
        let mut driver = Driver::new(rec.clone());

        driver.init(Some("secret"), Some(2)).await.unwrap();
        assert_eq!(
            rec.commands(),
            vec![vec!["AUTH", "secret"], vec!["SELECT", "2"]]
        );
    }

    #[tokio::test]
    async fn init_skips_default_database() {
        let rec = Recorder::default();
        let mut driver = Driver::new(rec.clone());

        driver.init(None, Some(0)).await.unwrap();
        driver.init(None, None).await.unwrap();
        assert!(rec.commands().is_empty());
    }
}
