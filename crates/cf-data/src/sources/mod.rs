pub mod scripted;
pub mod sqlite_source;

pub use scripted::ScriptedConnector;
pub use sqlite_source::SqliteConnector;
