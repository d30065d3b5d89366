mod error;
mod fallback;
mod hierarchy;
mod navigate;
mod references;
mod registry;
mod session;
mod transport;
mod types;

pub use error::{SessionError, session_error};

pub use fallback::{FallbackOutcome, FallbackRow, FallbackTool, MatchKind, search_workspace};

pub use hierarchy::{
    CallDirection, CallRow, CallSource, HierarchyOutcome, HierarchyRequest, resolve_hierarchy,
};

pub use navigate::{
    HierarchyQuery, HierarchyReply, Navigator, ReferencesQuery, ReferencesReply,
};

pub use references::{ReferenceRow, ReferenceSource, ReferencesRequest, resolve_references};

pub use registry::{
    ProbeReport, ProbeStatus, command_env_var, probe_server, probe_servers,
    resolve_server_command,
};

pub use session::{ServerCapabilities, Session, SessionOptions};

pub use types::{LspCallHierarchyItem, LspPosition, LspRange};
