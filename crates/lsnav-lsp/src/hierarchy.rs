//! Call-hierarchy traversal: prepare a root item, then walk callers or
//! callees breadth-first with cycle detection.
//!
//! The walk is an explicit worklist of `(item, remaining_depth)` pairs rather
//! than recursion. The visited set is the single source of truth for enqueue
//! decisions, so cyclic call graphs terminate and every item appears at most
//! once per direction.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::Session;
use crate::types::{
    LspCallHierarchyIncomingCall, LspCallHierarchyItem, LspCallHierarchyOutgoingCall, LspLocation,
    LspPosition, LspRange, parse_call_hierarchy_items, parse_incoming_calls, parse_locations,
    parse_outgoing_calls, symbol_kind_name, uri_to_path,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

impl CallDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            CallDirection::Incoming => "incoming",
            CallDirection::Outgoing => "outgoing",
        }
    }
}

/// Everything the traversal needs from a language server. `Session`
/// implements this; tests substitute scripted call graphs.
pub trait CallSource: Send + Sync {
    fn ensure_open(&self, path: &Path) -> impl Future<Output = Result<()>> + Send;
    fn prepare(
        &self,
        path: &Path,
        position: LspPosition,
    ) -> impl Future<Output = Result<Vec<LspCallHierarchyItem>>> + Send;
    fn definition(
        &self,
        path: &Path,
        position: LspPosition,
    ) -> impl Future<Output = Result<Vec<LspLocation>>> + Send;
    fn incoming(
        &self,
        item: &LspCallHierarchyItem,
    ) -> impl Future<Output = Result<Vec<LspCallHierarchyIncomingCall>>> + Send;
    fn outgoing(
        &self,
        item: &LspCallHierarchyItem,
    ) -> impl Future<Output = Result<Vec<LspCallHierarchyOutgoingCall>>> + Send;
}

impl CallSource for Session {
    async fn ensure_open(&self, path: &Path) -> Result<()> {
        self.open_from_disk(path).await
    }

    async fn prepare(&self, path: &Path, position: LspPosition) -> Result<Vec<LspCallHierarchyItem>> {
        let value = self.prepare_call_hierarchy(path, position).await?;
        parse_call_hierarchy_items(value)
    }

    async fn definition(&self, path: &Path, position: LspPosition) -> Result<Vec<LspLocation>> {
        let value = Session::definition(self, path, position).await?;
        parse_locations(value)
    }

    async fn incoming(&self, item: &LspCallHierarchyItem) -> Result<Vec<LspCallHierarchyIncomingCall>> {
        let value = self.incoming_calls(item).await?;
        parse_incoming_calls(value)
    }

    async fn outgoing(&self, item: &LspCallHierarchyItem) -> Result<Vec<LspCallHierarchyOutgoingCall>> {
        let value = self.outgoing_calls(item).await?;
        parse_outgoing_calls(value)
    }
}

#[derive(Debug, Clone)]
pub struct HierarchyRequest {
    pub file_path: PathBuf,
    pub position: LspPosition,
    pub direction: CallDirection,
    /// Traversal depth, 1 = direct calls only. Unbounded upward; the visited
    /// set bounds total work by distinct reachable items.
    pub max_depth: u32,
    pub max_calls_per_node: usize,
}

/// One discovered caller or callee. `depth` is 1 for direct calls.
#[derive(Debug, Clone, Serialize)]
pub struct CallRow {
    pub name: String,
    pub kind: String,
    pub file_path: String,
    pub uri: String,
    pub range: LspRange,
    pub selection_range: LspRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub depth: u32,
    pub call_sites: Vec<LspRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<lsnav_core::snippet::Snippet>,
}

impl CallRow {
    pub fn new(item: &LspCallHierarchyItem, call_sites: Vec<LspRange>, depth: u32) -> Self {
        Self {
            name: item.name.clone(),
            kind: symbol_kind_name(item.kind).to_string(),
            file_path: uri_to_path(&item.uri)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| item.uri.clone()),
            uri: item.uri.clone(),
            range: item.range.clone(),
            selection_range: item.selection_range.clone(),
            detail: item.detail.clone(),
            depth,
            call_sites,
            snippet: None,
        }
    }
}

#[derive(Debug)]
pub struct HierarchyOutcome {
    /// The resolved root item, `None` when the symbol could not be prepared.
    pub root: Option<LspCallHierarchyItem>,
    /// Flattened rows in breadth-first discovery order.
    pub rows: Vec<CallRow>,
    /// True when the root came from the definition-retry step.
    pub auto_followed: bool,
    /// True when some node's call list was cut at `max_calls_per_node`.
    pub truncated: bool,
    /// Set when an RPC failed mid-traversal; `rows` keeps what was gathered.
    pub interrupted: Option<anyhow::Error>,
}

enum AutoFollow {
    Followed(LspCallHierarchyItem),
    FollowedEmpty,
    NoDefinition,
}

pub async fn resolve_hierarchy<S: CallSource>(
    source: &S,
    request: &HierarchyRequest,
) -> HierarchyOutcome {
    let mut outcome = HierarchyOutcome {
        root: None,
        rows: Vec::new(),
        auto_followed: false,
        truncated: false,
        interrupted: None,
    };

    if let Err(err) = source.ensure_open(&request.file_path).await {
        outcome.interrupted = Some(err);
        return outcome;
    }

    let prepared = match source.prepare(&request.file_path, request.position).await {
        Ok(items) => items,
        Err(err) => {
            outcome.interrupted = Some(err.context("prepareCallHierarchy failed"));
            return outcome;
        }
    };

    // Servers usually return at most one item per exact position; take the
    // first in server order when they return more.
    let root = match prepared.into_iter().next() {
        Some(item) => item,
        None => match auto_follow(source, request).await {
            Ok(AutoFollow::Followed(item)) => {
                outcome.auto_followed = true;
                item
            }
            Ok(AutoFollow::FollowedEmpty) => {
                outcome.auto_followed = true;
                return outcome;
            }
            Ok(AutoFollow::NoDefinition) => return outcome,
            Err(err) => {
                outcome.interrupted = Some(err);
                return outcome;
            }
        },
    };

    debug!(
        root = %root.name,
        direction = request.direction.as_str(),
        depth = request.max_depth,
        "expanding call hierarchy"
    );

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(item_key(&root));
    outcome.root = Some(root.clone());

    let mut queue: VecDeque<(LspCallHierarchyItem, u32)> = VecDeque::new();
    if request.max_depth >= 1 {
        queue.push_back((root, request.max_depth));
    }

    while let Some((item, remaining)) = queue.pop_front() {
        let calls = match direct_calls(source, &item, request.direction).await {
            Ok(calls) => calls,
            Err(err) => {
                outcome.interrupted =
                    Some(err.context(format!("expanding calls of {:?} failed", item.name)));
                break;
            }
        };

        let mut taken = 0usize;
        for (related, call_sites) in calls {
            if taken >= request.max_calls_per_node {
                outcome.truncated = true;
                break;
            }
            // Mark before any further expansion; an already-visited item is
            // skipped entirely, which is what terminates cycles.
            if !visited.insert(item_key(&related)) {
                continue;
            }
            taken += 1;
            let depth = request.max_depth - remaining + 1;
            outcome.rows.push(CallRow::new(&related, call_sites, depth));
            if remaining > 1 {
                queue.push_back((related, remaining - 1));
            }
        }
    }

    outcome
}

/// Definition-retry for roots that do not prepare directly, typically a
/// cursor on an import or re-export. Runs at most once per invocation.
async fn auto_follow<S: CallSource>(source: &S, request: &HierarchyRequest) -> Result<AutoFollow> {
    let locations = source
        .definition(&request.file_path, request.position)
        .await
        .context("textDocument/definition failed during definition retry")?;
    let Some(target) = locations.into_iter().next() else {
        return Ok(AutoFollow::NoDefinition);
    };

    let target_path =
        uri_to_path(&target.uri).context("definition target is not a local file")?;
    debug!(target = %target_path.display(), "retrying prepare at definition target");
    if target_path != request.file_path {
        source.ensure_open(&target_path).await?;
    }

    let items = source
        .prepare(&target_path, target.range.start)
        .await
        .context("prepareCallHierarchy failed at definition target")?;
    Ok(match items.into_iter().next() {
        Some(item) => AutoFollow::Followed(item),
        None => AutoFollow::FollowedEmpty,
    })
}

async fn direct_calls<S: CallSource>(
    source: &S,
    item: &LspCallHierarchyItem,
    direction: CallDirection,
) -> Result<Vec<(LspCallHierarchyItem, Vec<LspRange>)>> {
    match direction {
        CallDirection::Incoming => Ok(source
            .incoming(item)
            .await?
            .into_iter()
            .map(|call| (call.from, call.from_ranges))
            .collect()),
        CallDirection::Outgoing => Ok(source
            .outgoing(item)
            .await?
            .into_iter()
            .map(|call| (call.to, call.from_ranges))
            .collect()),
    }
}

fn item_key(item: &LspCallHierarchyItem) -> String {
    format!("{}:{}:{}", item.uri, item.range.start.line, item.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SessionError, session_error};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    fn range_at(line: u32) -> LspRange {
        LspRange {
            start: LspPosition { line, character: 0 },
            end: LspPosition { line, character: 10 },
        }
    }

    fn item(name: &str, line: u32) -> LspCallHierarchyItem {
        LspCallHierarchyItem {
            name: name.to_string(),
            kind: 12,
            uri: format!("file:///ws/{name}.rs"),
            range: range_at(line),
            selection_range: range_at(line),
            detail: None,
        }
    }

    fn caller(name: &str, line: u32) -> LspCallHierarchyIncomingCall {
        LspCallHierarchyIncomingCall {
            from: item(name, line),
            from_ranges: vec![range_at(line + 1)],
        }
    }

    fn callee(name: &str, line: u32) -> LspCallHierarchyOutgoingCall {
        LspCallHierarchyOutgoingCall {
            to: item(name, line),
            from_ranges: vec![range_at(line + 1)],
        }
    }

    #[derive(Default)]
    struct ScriptedSource {
        prepare_by_path: HashMap<String, Vec<LspCallHierarchyItem>>,
        definitions: Vec<LspLocation>,
        incoming: HashMap<String, Vec<LspCallHierarchyIncomingCall>>,
        outgoing: HashMap<String, Vec<LspCallHierarchyOutgoingCall>>,
        failing: std::collections::HashSet<String>,
        log: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn count(&self, prefix: &str) -> usize {
            self.log
                .lock()
                .unwrap()
                .iter()
                .filter(|entry| entry.starts_with(prefix))
                .count()
        }
    }

    impl CallSource for ScriptedSource {
        async fn ensure_open(&self, _path: &Path) -> Result<()> {
            Ok(())
        }

        async fn prepare(
            &self,
            path: &Path,
            _position: LspPosition,
        ) -> Result<Vec<LspCallHierarchyItem>> {
            let key = path.display().to_string();
            self.log.lock().unwrap().push(format!("prepare:{key}"));
            Ok(self.prepare_by_path.get(&key).cloned().unwrap_or_default())
        }

        async fn definition(
            &self,
            _path: &Path,
            _position: LspPosition,
        ) -> Result<Vec<LspLocation>> {
            self.log.lock().unwrap().push("definition".to_string());
            Ok(self.definitions.clone())
        }

        async fn incoming(
            &self,
            item: &LspCallHierarchyItem,
        ) -> Result<Vec<LspCallHierarchyIncomingCall>> {
            self.log
                .lock()
                .unwrap()
                .push(format!("incoming:{}", item.name));
            if self.failing.contains(&item.name) {
                return Err(SessionError::RequestTimeout {
                    method: "callHierarchy/incomingCalls".to_string(),
                    after: Duration::from_secs(1),
                }
                .into());
            }
            Ok(self.incoming.get(&item.name).cloned().unwrap_or_default())
        }

        async fn outgoing(
            &self,
            item: &LspCallHierarchyItem,
        ) -> Result<Vec<LspCallHierarchyOutgoingCall>> {
            self.log
                .lock()
                .unwrap()
                .push(format!("outgoing:{}", item.name));
            Ok(self.outgoing.get(&item.name).cloned().unwrap_or_default())
        }
    }

    fn request(direction: CallDirection, depth: u32) -> HierarchyRequest {
        HierarchyRequest {
            file_path: PathBuf::from("/ws/main.rs"),
            position: LspPosition { line: 0, character: 0 },
            direction,
            max_depth: depth,
            max_calls_per_node: 50,
        }
    }

    fn rooted(source: &mut ScriptedSource, name: &str) {
        source
            .prepare_by_path
            .insert("/ws/main.rs".to_string(), vec![item(name, 1)]);
    }

    fn row_names(outcome: &HierarchyOutcome) -> Vec<&str> {
        outcome.rows.iter().map(|r| r.name.as_str()).collect()
    }

    #[tokio::test]
    async fn cyclic_graph_terminates_with_each_item_once() {
        let mut source = ScriptedSource::default();
        rooted(&mut source, "a");
        source.incoming.insert("a".to_string(), vec![caller("b", 10)]);
        source.incoming.insert("b".to_string(), vec![caller("a", 1)]);

        let outcome = resolve_hierarchy(&source, &request(CallDirection::Incoming, 10)).await;

        assert_eq!(row_names(&outcome), vec!["b"]);
        assert!(outcome.interrupted.is_none());
        // One expansion per distinct item, never more.
        assert_eq!(source.count("incoming:"), 2);
    }

    #[tokio::test]
    async fn depth_one_contains_only_direct_calls() {
        let mut source = ScriptedSource::default();
        rooted(&mut source, "a");
        source.incoming.insert("a".to_string(), vec![caller("b", 10)]);
        source.incoming.insert("b".to_string(), vec![caller("c", 20)]);

        let outcome = resolve_hierarchy(&source, &request(CallDirection::Incoming, 1)).await;

        assert_eq!(row_names(&outcome), vec!["b"]);
        assert_eq!(source.count("incoming:"), 1);
    }

    #[tokio::test]
    async fn depth_counts_up_from_direct_calls() {
        let mut source = ScriptedSource::default();
        rooted(&mut source, "a");
        source.incoming.insert("a".to_string(), vec![caller("b", 10)]);
        source.incoming.insert("b".to_string(), vec![caller("c", 20)]);
        source.incoming.insert("c".to_string(), vec![caller("d", 30)]);

        let outcome = resolve_hierarchy(&source, &request(CallDirection::Incoming, 3)).await;

        let depths: Vec<(String, u32)> = outcome
            .rows
            .iter()
            .map(|r| (r.name.clone(), r.depth))
            .collect();
        assert_eq!(
            depths,
            vec![
                ("b".to_string(), 1),
                ("c".to_string(), 2),
                ("d".to_string(), 3)
            ]
        );
    }

    #[tokio::test]
    async fn shared_callee_in_a_diamond_appears_once() {
        let mut source = ScriptedSource::default();
        rooted(&mut source, "a");
        source
            .incoming
            .insert("a".to_string(), vec![caller("b", 10), caller("c", 20)]);
        source.incoming.insert("b".to_string(), vec![caller("d", 30)]);
        source.incoming.insert("c".to_string(), vec![caller("d", 30)]);

        let outcome = resolve_hierarchy(&source, &request(CallDirection::Incoming, 3)).await;

        assert_eq!(row_names(&outcome), vec!["b", "c", "d"]);
    }

    #[tokio::test]
    async fn per_node_cap_truncates_and_flags() {
        let mut source = ScriptedSource::default();
        rooted(&mut source, "a");
        source.incoming.insert(
            "a".to_string(),
            vec![caller("b", 10), caller("c", 20), caller("d", 30)],
        );

        let mut req = request(CallDirection::Incoming, 1);
        req.max_calls_per_node = 2;
        let outcome = resolve_hierarchy(&source, &req).await;

        assert_eq!(row_names(&outcome), vec!["b", "c"]);
        assert!(outcome.truncated);
    }

    #[tokio::test]
    async fn definition_retry_runs_exactly_once() {
        let mut source = ScriptedSource::default();
        source
            .prepare_by_path
            .insert("/ws/main.rs".to_string(), Vec::new());
        source
            .prepare_by_path
            .insert("/ws/lib.rs".to_string(), vec![item("a", 1)]);
        source.definitions = vec![LspLocation {
            uri: "file:///ws/lib.rs".to_string(),
            range: range_at(1),
        }];
        source.incoming.insert("a".to_string(), vec![caller("b", 10)]);

        let outcome = resolve_hierarchy(&source, &request(CallDirection::Incoming, 2)).await;

        assert!(outcome.auto_followed);
        assert_eq!(outcome.root.as_ref().map(|r| r.name.as_str()), Some("a"));
        assert_eq!(row_names(&outcome), vec!["b"]);
        assert_eq!(source.count("prepare:"), 2);
        assert_eq!(source.count("definition"), 1);
    }

    #[tokio::test]
    async fn definition_retry_gives_up_after_one_attempt() {
        let mut source = ScriptedSource::default();
        source
            .prepare_by_path
            .insert("/ws/main.rs".to_string(), Vec::new());
        source
            .prepare_by_path
            .insert("/ws/lib.rs".to_string(), Vec::new());
        source.definitions = vec![LspLocation {
            uri: "file:///ws/lib.rs".to_string(),
            range: range_at(1),
        }];

        let outcome = resolve_hierarchy(&source, &request(CallDirection::Incoming, 2)).await;

        assert!(outcome.root.is_none());
        assert!(outcome.auto_followed);
        assert!(outcome.interrupted.is_none());
        assert_eq!(source.count("prepare:"), 2);
        assert_eq!(source.count("definition"), 1);
    }

    #[tokio::test]
    async fn unresolvable_symbol_is_a_quiet_empty() {
        let mut source = ScriptedSource::default();
        source
            .prepare_by_path
            .insert("/ws/main.rs".to_string(), Vec::new());

        let outcome = resolve_hierarchy(&source, &request(CallDirection::Incoming, 2)).await;

        assert!(outcome.root.is_none());
        assert!(!outcome.auto_followed);
        assert!(outcome.interrupted.is_none());
        assert!(outcome.rows.is_empty());
    }

    #[tokio::test]
    async fn mid_traversal_timeout_keeps_partial_rows() {
        let mut source = ScriptedSource::default();
        rooted(&mut source, "a");
        source.incoming.insert("a".to_string(), vec![caller("b", 10)]);
        source.failing.insert("b".to_string());

        let outcome = resolve_hierarchy(&source, &request(CallDirection::Incoming, 3)).await;

        assert_eq!(row_names(&outcome), vec!["b"]);
        let err = outcome.interrupted.expect("traversal should be interrupted");
        assert!(session_error(&err).is_some_and(SessionError::is_timeout));
    }

    #[tokio::test]
    async fn outgoing_direction_walks_callees() {
        let mut source = ScriptedSource::default();
        rooted(&mut source, "a");
        source.outgoing.insert("a".to_string(), vec![callee("x", 5)]);
        source.outgoing.insert("x".to_string(), vec![callee("y", 6)]);

        let outcome = resolve_hierarchy(&source, &request(CallDirection::Outgoing, 2)).await;

        assert_eq!(row_names(&outcome), vec!["x", "y"]);
        assert_eq!(source.count("incoming:"), 0);
    }
}
