use std::sync::Arc;

use crate::{
    bson::Document,
    client::check_ok,
    coll::Collection,
    command::Command,
    error::Result,
    Client,
    ClientSession,
};

/// `Database` is the client-side abstraction of a MongoDB database. It can be used to run
/// commands and to obtain handles to collections.
///
/// `Database` uses [`std::sync::Arc`](https://doc.rust-lang.org/std/sync/struct.Arc.html) internally,
/// so it can safely be shared across threads or async tasks.
#[derive(Clone, Debug)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

#[derive(Debug)]
struct DatabaseInner {
    client: Client,
    name: String,
}

impl Database {
    pub(crate) fn new(client: Client, name: &str) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                client,
                name: name.to_string(),
            }),
        }
    }

    /// Get the `Client` that this database descended from.
    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    /// Gets the name of the `Database`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Gets a handle to a collection in this database with the provided name.
    ///
    /// This method does not send or receive anything across the wire to the database, so it can be
    /// used repeatedly without incurring any costs from I/O.
    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(self.clone(), name)
    }

    /// Runs a database-level command.
    ///
    /// `command` may be wrapped in a `query` or `$query` document alongside a `$readPreference`.
    /// Session fields, cluster time gossip, causal read concerns and transaction numbers are
    /// attached as applicable. A reply with `ok: 0` is returned as a
    /// [`ErrorKind::Command`](crate::error::ErrorKind::Command) error.
    pub async fn run_command(
        &self,
        command: Document,
        session: impl Into<Option<&mut ClientSession>>,
    ) -> Result<Document> {
        let command = Command::from_document(self.name(), command)?;
        let response = self.client().execute_command(command, session.into()).await?;
        check_ok(response)
    }

    /// Runs a database-level command and returns the raw reply, even when it reports `ok: 0`.
    pub async fn run_raw_command(
        &self,
        command: Document,
        session: impl Into<Option<&mut ClientSession>>,
    ) -> Result<Document> {
        let command = Command::from_document(self.name(), command)?;
        self.client().execute_command(command, session.into()).await
    }
}

/// A [`Database`] bound to a [`ClientSession`]: every command run through it uses the session.
/// Obtained from [`ClientSession::database`].
#[derive(Debug)]
pub struct SessionDatabase<'a> {
    database: Database,
    session: &'a mut ClientSession,
}

impl<'a> SessionDatabase<'a> {
    pub(crate) fn new(database: Database, session: &'a mut ClientSession) -> Self {
        Self { database, session }
    }

    /// Gets the name of the underlying database.
    pub fn name(&self) -> &str {
        self.database.name()
    }

    /// The underlying session.
    pub fn session(&mut self) -> &mut ClientSession {
        self.session
    }

    /// Gets a session-less handle to a collection of the underlying database. Pass
    /// [`SessionDatabase::session`] to its operations to keep using the session.
    pub fn collection(&self, name: &str) -> Collection {
        self.database.collection(name)
    }

    /// Runs a database-level command through the session. See [`Database::run_command`].
    pub async fn run_command(&mut self, command: Document) -> Result<Document> {
        self.database.run_command(command, &mut *self.session).await
    }
}
