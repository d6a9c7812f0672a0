//! In-memory doubles shared by the unit tests.

mod factories;
mod harness;
mod mocks;

pub use factories::{registration_form, test_user};
pub use harness::{TestBackend, csrf_token, open_session, test_backend, test_config, test_server};
pub use mocks::{
    InMemoryChatRepo, InMemoryPaymentRepo, InMemoryRoleRepo, InMemorySessionStore,
    InMemorySettingsRepo, InMemorySubscriptionRepo, InMemoryUserRepo, RecordingEmailSender,
    RecordingSmsSender, ScriptedCompletionClient, StubPaymentGateway,
};
