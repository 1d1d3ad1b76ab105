//! Command surface.
//!
//! Maps a command name and its ordered string arguments onto the record
//! store and returns the result as bytes.
//!
//! | Command | Arguments | Result |
//! |---------|-----------|--------|
//! | `init` | | empty |
//! | `reset_indexes` | | empty |
//! | `add_user` | user id, user JSON | empty |
//! | `add_thing` | thing id, thing JSON | empty |
//! | `create_brokerage_request` | request JSON | request id |
//! | `update_brokerage_application` | kind, payload, request id; or update JSON | time stamps JSON |
//! | `get_user` | user id | user JSON |
//! | `get_thing` | thing id | thing JSON |
//! | `get_all_things` | | enumeration JSON |
//! | `authenticate` | user id, optional password (ignored) | outcome JSON |
//! | `get_brokerage_request` | request id | request JSON |
//! | `get_all_brokerage_requests` | | enumeration JSON |
//! | `add_resource` | owner, hash, path | empty |
//! | `get_resource` | owner, hash | path |

use brokerage_ledger_storage::StorageBackend;

use crate::{
    codec,
    error::{RecordError, RecordResult},
    lifecycle::UpdateKind,
    store::RecordStore,
};

/// Every command name the router accepts.
pub const COMMANDS: [&str; 14] = [
    "init",
    "reset_indexes",
    "add_user",
    "add_thing",
    "create_brokerage_request",
    "update_brokerage_application",
    "get_user",
    "get_thing",
    "get_all_things",
    "authenticate",
    "get_brokerage_request",
    "get_all_brokerage_requests",
    "add_resource",
    "get_resource",
];

/// Dispatches commands to a [`RecordStore`].
#[derive(Clone)]
pub struct CommandRouter<B> {
    store: RecordStore<B>,
}

impl<B: StorageBackend + Clone> CommandRouter<B> {
    /// Creates a router over `store`.
    pub fn new(store: RecordStore<B>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &RecordStore<B> {
        &self.store
    }

    /// Executes one command.
    ///
    /// # Errors
    ///
    /// - [`RecordError::UnknownCommand`] for a name not in [`COMMANDS`]
    /// - [`RecordError::InvalidArguments`] for a wrong argument count
    /// - whatever the command itself returns
    #[tracing::instrument(skip(self, args), fields(args = args.len()))]
    pub async fn execute(&self, name: &str, args: &[String]) -> RecordResult<Vec<u8>> {
        let result = self.dispatch(name, args).await;
        match &result {
            Ok(bytes) => tracing::debug!(len = bytes.len(), "command finished"),
            Err(e) => tracing::debug!(error = %e, "command failed"),
        }
        result
    }

    async fn dispatch(&self, name: &str, args: &[String]) -> RecordResult<Vec<u8>> {
        let store = &self.store;
        match name {
            "init" => {
                let [] = arity::<0>(name, args)?;
                store.initialize().await?;
                Ok(Vec::new())
            },
            "reset_indexes" => {
                let [] = arity::<0>(name, args)?;
                store.reset_indexes().await?;
                Ok(Vec::new())
            },
            "add_user" => {
                let [user_id, json] = arity::<2>(name, args)?;
                store.directory().add_user(user_id, json.as_bytes()).await?;
                Ok(Vec::new())
            },
            "add_thing" => {
                let [thing_id, json] = arity::<2>(name, args)?;
                store.directory().add_thing(thing_id, json.as_bytes()).await?;
                Ok(Vec::new())
            },
            "create_brokerage_request" => {
                let [json] = arity::<1>(name, args)?;
                let request_id = store.lifecycle().create(json.as_bytes()).await?;
                Ok(request_id.into_bytes())
            },
            "update_brokerage_application" => {
                let stamps = match args {
                    [json] => store.lifecycle().update_from_json(json.as_bytes()).await?,
                    [kind, payload, request_id] => {
                        let kind: UpdateKind = kind.parse()?;
                        store.lifecycle().update(request_id, kind, payload).await?
                    },
                    _ => return Err(wrong_arity(name, "1 or 3", args.len())),
                };
                codec::encode(&stamps)
            },
            "get_user" => {
                let [user_id] = arity::<1>(name, args)?;
                codec::encode(&store.directory().get_user(user_id).await?)
            },
            "get_thing" => {
                let [thing_id] = arity::<1>(name, args)?;
                codec::encode(&store.directory().get_thing(thing_id).await?)
            },
            "get_all_things" => {
                let [] = arity::<0>(name, args)?;
                codec::encode(&store.directory().list_things().await?)
            },
            "authenticate" => {
                let user_id = match args {
                    [user_id] | [user_id, _] => user_id,
                    _ => return Err(wrong_arity(name, "1 or 2", args.len())),
                };
                codec::encode(&store.authenticator().authenticate(user_id).await?)
            },
            "get_brokerage_request" => {
                let [request_id] = arity::<1>(name, args)?;
                codec::encode(&store.lifecycle().get(request_id).await?)
            },
            "get_all_brokerage_requests" => {
                let [] = arity::<0>(name, args)?;
                codec::encode(&store.lifecycle().list_all().await?)
            },
            "add_resource" => {
                let [owner, hash, path] = arity::<3>(name, args)?;
                store.resources().add_resource(owner, hash, path).await?;
                Ok(Vec::new())
            },
            "get_resource" => {
                let [owner, hash] = arity::<2>(name, args)?;
                Ok(store.resources().get_resource(owner, hash).await?.into_bytes())
            },
            _ => Err(RecordError::UnknownCommand { name: name.to_owned() }),
        }
    }
}

fn arity<'a, const N: usize>(name: &str, args: &'a [String]) -> RecordResult<&'a [String; N]> {
    args.try_into().map_err(|_| wrong_arity(name, &N.to_string(), args.len()))
}

fn wrong_arity(name: &str, expected: &str, got: usize) -> RecordError {
    RecordError::invalid_arguments(format!("{name} expects {expected} argument(s), got {got}"))
}
