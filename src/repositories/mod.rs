// src/repositories/mod.rs
// One repository per aggregate root. Each exposes plain `*_sync(conn, ...)`
// functions that operate within a caller-owned connection — "session mode",
// used when several writes must share one transaction scope — plus a thin
// async wrapper type holding a `Arc<DatabasePool>` whose methods each open
// their own scope via `pool.run` — "session-factory mode", used when each
// write should survive even if a later step in the same tool call fails.

pub mod action;
pub mod context;
pub mod http_request;
pub mod mission;
pub mod tag;
pub mod target;

pub use action::MissionActionRepository;
pub use context::ContextRepository;
pub use http_request::HttpRequestRepository;
pub use mission::MissionRepository;
pub use tag::RequestTagRepository;
pub use target::TargetRepository;
