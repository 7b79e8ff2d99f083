pub mod db;
pub mod identity;
pub mod mailer;

pub use db::DbAdapter;
pub use identity::PgIdentityAdapter;
pub use mailer::{LogMailer, Mailer, SmtpMailer};
