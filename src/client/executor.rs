
use std::time::Instant;

use crate::{
    bson::{self, Document},
    bson_util,
    channel::{ChannelExt, SendOptions},
    client::session::cluster_time::max_time,
    command::Command,
    error::{Error, Result, RETRYABLE_WRITE_ERROR},
    operation::{
        has_retryable_error,
        is_causal_read,
        CommandErrorBody,
        CommandResponse,
        Retryability,
    },
    trace::{TracingRepresentation, COMMAND_TRACING_EVENT_TARGET},
    Client,
    ClientSession,
};

impl Client {
    /// Runs `command` through the decorator and the retry executor. If no session is provided,
    /// an implicit one is used for the duration of the call.
    ///
    /// The raw reply is returned, including replies with `ok: 0`; see [`check_ok`].
    pub(crate) async fn execute_command(
        &self,
        command: Command,
        session: Option<&mut ClientSession>,
    ) -> Result<Document> {
        match session {
            Some(session) => self.execute_command_with_session(command, session).await,
            None => {
                let mut implicit_session = self.start_implicit_session();
                self.execute_command_with_session(command, &mut implicit_session)
                    .await
            }
        }
    }

    async fn execute_command_with_session(
        &self,
        command: Command,
        session: &mut ClientSession,
    ) -> Result<Document> {
        self.channel().check_compatibility()?;
        let command = self.decorate(&command, session)?;
        let read_preference = command
            .read_preference
            .clone()
            .or_else(|| session.options().and_then(|o| o.read_preference.clone()))
            .or_else(|| self.options().read_preference.clone());
        let send_options = SendOptions {
            read_preference,
            is_retry: false,
        };
        self.execute_with_retry(command, session, send_options).await
    }

    /// Produces the wire-ready form of `command` for `session`. The input is left untouched.
    pub(crate) fn decorate(
        &self,
        command: &Command,
        session: &mut ClientSession,
    ) -> Result<Command> {
        session.check_not_ended()?;
        let mut command = command.clone();
        let channel = self.channel();
        let options = self.options();

        if command.lsid.is_none() && (!session.is_implicit() || options.implicit_sessions) {
            command.set_session(session.id());
            session.update_last_use();
        }

        if channel.supports_cluster_time_gossip() && command.cluster_time.is_none() {
            let client_cluster_time = channel.cluster_time();
            if let Some(cluster_time) =
                max_time(client_cluster_time.as_ref(), session.cluster_time())
            {
                command.set_cluster_time(cluster_time);
            }
        }

        if is_causal_read(&command) {
            if command.read_concern.is_none() {
                let default_read_concern = session
                    .options()
                    .and_then(|o| o.read_concern.as_ref())
                    .or(options.read_concern.as_ref());
                if let Some(read_concern) = default_read_concern {
                    command.read_concern = Some(read_concern.to_document()?);
                }
            }
            if session.causal_consistency() && !command.has_after_cluster_time() {
                if let Some(operation_time) = session.operation_time() {
                    command.set_after_cluster_time(operation_time);
                }
            }
        }

        if options.assign_txn_numbers
            && command.txn_number.is_none()
            && command.lsid.is_some()
            && channel.supports_retryable_writes()
            && session.retry_writes()
            && Retryability::of(&command) == Retryability::Write
        {
            command.set_txn_number(session.get_and_increment_txn_number());
        }

        Ok(command)
    }

    /// Advances the session's and the client's time trackers from a reply.
    pub(crate) fn process_response(&self, session: &mut ClientSession, response: &Document) {
        let response = CommandResponse::parse(response);
        if let Some(operation_time) = response.operation_time {
            session.advance_operation_time(operation_time);
        }
        if let Some(ref cluster_time) = response.cluster_time {
            session.advance_cluster_time(cluster_time);
            self.channel().advance_cluster_time(cluster_time);
        }
    }

    /// Sends a decorated command, replaying it within the retry budget when it carries a
    /// transaction number. Only this layer absorbs failures.
    async fn execute_with_retry(
        &self,
        command: Command,
        session: &mut ClientSession,
        mut send_options: SendOptions,
    ) -> Result<Document> {
        let retryable = command.txn_number.is_some() && self.options().retry_on_error;
        let mut attempts_left = if retryable {
            self.options().max_retry_attempts
        } else {
            0
        };
        let name = command.name().to_string();
        let target_db = command.target_db.clone();
        let txn_number = command.txn_number;
        let document = command.into_document()?;

        loop {
            let result = self
                .send_command(&target_db, &name, document.clone(), &send_options, session)
                .await;

            match result {
                Ok(response) => {
                    if attempts_left == 0 || !has_retryable_error(&response) {
                        return Ok(response);
                    }
                    tracing::debug!(
                        target: COMMAND_TRACING_EVENT_TARGET,
                        commandName = name.as_str(),
                        txnNumber = txn_number,
                        reply = response.tracing_representation(),
                        "Retrying write after a retryable error reply"
                    );
                }
                Err(mut error) => {
                    if error.is_network_error() {
                        session.mark_dirty();
                    }
                    if !retryable || !error.is_network_error() {
                        return Err(error);
                    }
                    error.add_label(RETRYABLE_WRITE_ERROR);
                    if attempts_left == 0 {
                        return Err(error);
                    }
                    if let Err(reconnect_error) = self.channel().reconnect().await {
                        tracing::debug!(
                            target: COMMAND_TRACING_EVENT_TARGET,
                            commandName = name.as_str(),
                            error = reconnect_error.tracing_representation(),
                            "Not retrying write: reconnect failed"
                        );
                        return Err(error);
                    }
                    if !self.channel().supports_retryable_writes() {
                        tracing::debug!(
                            target: COMMAND_TRACING_EVENT_TARGET,
                            commandName = name.as_str(),
                            "Not retrying write: server no longer supports retryable writes"
                        );
                        return Err(error);
                    }
                    tracing::debug!(
                        target: COMMAND_TRACING_EVENT_TARGET,
                        commandName = name.as_str(),
                        txnNumber = txn_number,
                        error = error.tracing_representation(),
                        "Retrying write after a network error"
                    );
                }
            }

            attempts_left -= 1;
            send_options.is_retry = true;
        }
    }

    /// A single round trip. Every reply, successful or not, is fed to `process_response`.
    async fn send_command(
        &self,
        target_db: &str,
        name: &str,
        command: Document,
        send_options: &SendOptions,
        session: &mut ClientSession,
    ) -> Result<Document> {
        tracing::debug!(
            target: COMMAND_TRACING_EVENT_TARGET,
            command = command.tracing_representation(),
            databaseName = target_db,
            commandName = name,
            isRetry = send_options.is_retry,
            "Command started"
        );
        let start_time = Instant::now();
        let result = self.channel().send(target_db, command, send_options).await;
        let duration = start_time.elapsed();

        match result {
            Ok(response) => {
                self.process_response(session, &response);
                if bson_util::get_int_field(&response, "ok") == Some(1) {
                    tracing::debug!(
                        target: COMMAND_TRACING_EVENT_TARGET,
                        reply = response.tracing_representation(),
                        commandName = name,
                        durationMS = duration.as_millis(),
                        "Command succeeded"
                    );
                } else {
                    tracing::debug!(
                        target: COMMAND_TRACING_EVENT_TARGET,
                        failure = response.tracing_representation(),
                        commandName = name,
                        durationMS = duration.as_millis(),
                        "Command failed"
                    );
                }
                Ok(response)
            }
            Err(error) => {
                tracing::debug!(
                    target: COMMAND_TRACING_EVENT_TARGET,
                    failure = error.tracing_representation(),
                    commandName = name,
                    durationMS = duration.as_millis(),
                    "Command failed"
                );
                Err(error)
            }
        }
    }
}

/// Converts a reply with `ok: 0` into an [`ErrorKind::Command`](crate::error::ErrorKind::Command)
/// error.
pub(crate) fn check_ok(response: Document) -> Result<Document> {
    if bson_util::get_int_field(&response, "ok") == Some(1) {
        return Ok(response);
    }
    match bson::from_document::<CommandErrorBody>(response.clone()) {
        Ok(mut body) => {
            // Retryable writes are only supported by storage engines with document-level
            // locking, so users need to disable retryable writes if using mmapv1.
            let command_error = &mut body.command_error;
            if command_error.code == 20 && command_error.message.starts_with("Transaction numbers")
            {
                command_error.message = "This MongoDB deployment does not support retryable \
                                         writes. Please disable retry_writes."
                    .to_string();
            }
            Err(body.into())
        }
        Err(_) => Err(Error::invalid_response(format!(
            "command failed without an error code: {}",
            response.tracing_representation()
        ))),
    }
}
