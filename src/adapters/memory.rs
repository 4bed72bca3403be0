//! In-Memory Adapters
//!
//! Deterministic stand-ins for the kernel target tree and for external
//! commands. Used by unit and integration tests, and by `--dry-run`.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::ports::{
    AttributePath, CommandExecutor, CommandOutput, CommandSpec, Nqn, NvmetStore, PortId,
};
use crate::error::{Error, Result};

// =============================================================================
// In-Memory NVMe Target Tree
// =============================================================================

#[derive(Debug, Default)]
struct Tree {
    /// Directory paths relative to the root, e.g. `ports/1`.
    dirs: BTreeSet<String>,
    attributes: BTreeMap<String, String>,
    /// Link path -> target directory.
    links: BTreeMap<String, String>,
    /// Remaining `create_port` calls that lose a simulated race.
    port_races: u32,
}

/// In-memory NVMe target tree mirroring configfs semantics.
#[derive(Debug, Default)]
pub struct InMemoryNvmetStore {
    tree: RwLock<Tree>,
}

fn subsystem_dir(nqn: &Nqn) -> String {
    format!("subsystems/{}", nqn)
}

fn namespace_dir(nqn: &Nqn, nsid: u32) -> String {
    format!("subsystems/{}/namespaces/{}", nqn, nsid)
}

fn port_dir(port_id: PortId) -> String {
    format!("ports/{}", port_id)
}

fn port_link(port_id: PortId, nqn: &Nqn) -> String {
    format!("ports/{}/subsystems/{}", port_id, nqn)
}

impl InMemoryNvmetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a port directory out-of-band, as another operator would.
    pub fn insert_port(&self, port_id: PortId) {
        self.tree.write().dirs.insert(port_dir(port_id));
    }

    /// Make the next `count` port creations fail because a concurrent
    /// writer created the same id first.
    pub fn simulate_port_races(&self, count: u32) {
        self.tree.write().port_races = count;
    }

    pub fn has_subsystem(&self, nqn: &Nqn) -> bool {
        self.tree.read().dirs.contains(&subsystem_dir(nqn))
    }

    pub fn has_port(&self, port_id: PortId) -> bool {
        self.tree.read().dirs.contains(&port_dir(port_id))
    }

    /// Current value of an attribute, if written.
    pub fn attribute(&self, path: &AttributePath) -> Option<String> {
        self.tree.read().attributes.get(path.as_str()).cloned()
    }

    /// Target of a port link, if present.
    pub fn link_target(&self, port_id: PortId, nqn: &Nqn) -> Option<String> {
        self.tree.read().links.get(&port_link(port_id, nqn)).cloned()
    }

    pub fn link_count(&self) -> usize {
        self.tree.read().links.len()
    }

    fn has_children(tree: &Tree, dir: &str) -> bool {
        let prefix = format!("{}/", dir);
        tree.dirs.iter().any(|d| d.starts_with(&prefix))
            || tree.links.keys().any(|l| l.starts_with(&prefix))
    }
}

#[async_trait]
impl NvmetStore for InMemoryNvmetStore {
    async fn list_port_ids(&self) -> Result<BTreeSet<PortId>> {
        let tree = self.tree.read();
        Ok(tree
            .dirs
            .iter()
            .filter_map(|d| d.strip_prefix("ports/"))
            .filter(|rest| !rest.contains('/'))
            .filter_map(|id| id.parse::<u32>().ok())
            .map(PortId)
            .collect())
    }

    async fn create_subsystem(&self, nqn: &Nqn) -> Result<()> {
        let mut tree = self.tree.write();
        if !tree.dirs.insert(subsystem_dir(nqn)) {
            return Err(Error::SubsystemAlreadyExists {
                nqn: nqn.to_string(),
            });
        }
        Ok(())
    }

    async fn create_namespace(&self, nqn: &Nqn, nsid: u32) -> Result<()> {
        let mut tree = self.tree.write();
        if !tree.dirs.contains(&subsystem_dir(nqn)) {
            return Err(Error::NotFound(format!("subsystem {}", nqn)));
        }
        if !tree.dirs.insert(namespace_dir(nqn, nsid)) {
            return Err(Error::Internal(format!(
                "namespace {} already exists under {}",
                nsid, nqn
            )));
        }
        Ok(())
    }

    async fn create_port(&self, port_id: PortId) -> Result<()> {
        let mut tree = self.tree.write();
        if tree.port_races > 0 {
            tree.port_races -= 1;
            tree.dirs.insert(port_dir(port_id));
            return Err(Error::PortAlreadyExists {
                port_id: port_id.get(),
            });
        }
        if !tree.dirs.insert(port_dir(port_id)) {
            return Err(Error::PortAlreadyExists {
                port_id: port_id.get(),
            });
        }
        Ok(())
    }

    async fn link_port_to_subsystem(&self, port_id: PortId, nqn: &Nqn) -> Result<()> {
        let mut tree = self.tree.write();
        if !tree.dirs.contains(&port_dir(port_id)) {
            return Err(Error::NotFound(format!("port {}", port_id)));
        }
        if !tree.dirs.contains(&subsystem_dir(nqn)) {
            return Err(Error::NotFound(format!("subsystem {}", nqn)));
        }
        let link = port_link(port_id, nqn);
        if tree.links.contains_key(&link) {
            return Err(Error::Internal(format!("link {} already exists", link)));
        }
        tree.links.insert(link, subsystem_dir(nqn));
        Ok(())
    }

    async fn write_attribute(&self, path: &AttributePath, value: &str) -> Result<()> {
        let mut tree = self.tree.write();
        if !tree.dirs.contains(path.parent()) {
            return Err(Error::NotFound(path.to_string()));
        }
        tree.attributes
            .insert(path.as_str().to_string(), value.trim_end().to_string());
        Ok(())
    }

    async fn read_attribute(&self, path: &AttributePath) -> Result<String> {
        self.attribute(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn port_links(&self, port_id: PortId) -> Result<BTreeSet<Nqn>> {
        let prefix = format!("{}/subsystems/", port_dir(port_id));
        let tree = self.tree.read();
        Ok(tree
            .links
            .keys()
            .filter_map(|l| l.strip_prefix(&prefix))
            .map(|name| Nqn(name.to_string()))
            .collect())
    }

    async fn unlink_port_from_subsystem(&self, port_id: PortId, nqn: &Nqn) -> Result<()> {
        let link = port_link(port_id, nqn);
        self.tree
            .write()
            .links
            .remove(&link)
            .map(|_| ())
            .ok_or(Error::NotFound(link))
    }

    async fn remove_namespace(&self, nqn: &Nqn, nsid: u32) -> Result<()> {
        let dir = namespace_dir(nqn, nsid);
        let mut tree = self.tree.write();
        if !tree.dirs.remove(&dir) {
            return Err(Error::NotFound(dir));
        }
        let prefix = format!("{}/", dir);
        tree.attributes.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    async fn remove_subsystem(&self, nqn: &Nqn) -> Result<()> {
        let dir = subsystem_dir(nqn);
        let mut tree = self.tree.write();
        if !tree.dirs.contains(&dir) {
            return Err(Error::NotFound(dir));
        }
        if Self::has_children(&tree, &dir) || tree.links.values().any(|t| *t == dir) {
            return Err(Error::Internal(format!("{} is still in use", dir)));
        }
        tree.dirs.remove(&dir);
        let prefix = format!("{}/", dir);
        tree.attributes.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    async fn remove_port(&self, port_id: PortId) -> Result<()> {
        let dir = port_dir(port_id);
        let mut tree = self.tree.write();
        if !tree.dirs.contains(&dir) {
            return Err(Error::NotFound(dir));
        }
        if Self::has_children(&tree, &dir) {
            return Err(Error::Internal(format!("{} is still in use", dir)));
        }
        tree.dirs.remove(&dir);
        let prefix = format!("{}/", dir);
        tree.attributes.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }
}

// =============================================================================
// Recording Command Executor
// =============================================================================

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    exit_code: i32,
    stdout: String,
    stderr: String,
}

/// Executor that records every command instead of running it.
///
/// Commands succeed with empty output unless a rule whose needle is a
/// substring of the rendered command says otherwise. The first matching rule
/// wins.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    invocations: RwLock<Vec<CommandSpec>>,
    rules: RwLock<Vec<Rule>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any command containing `needle`.
    pub fn fail_when(&self, needle: impl Into<String>, exit_code: i32, stderr: impl Into<String>) {
        self.rules.write().push(Rule {
            needle: needle.into(),
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        });
    }

    /// Succeed with `stdout` for any command containing `needle`.
    pub fn stdout_when(&self, needle: impl Into<String>, stdout: impl Into<String>) {
        self.rules.write().push(Rule {
            needle: needle.into(),
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        });
    }

    /// Rendered commands in invocation order.
    pub fn commands(&self) -> Vec<String> {
        self.invocations.read().iter().map(|c| c.render()).collect()
    }

    pub fn invocations(&self) -> Vec<CommandSpec> {
        self.invocations.read().clone()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn execute(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let rendered = command.render();
        self.invocations.write().push(command.clone());

        let rule = self
            .rules
            .read()
            .iter()
            .find(|r| rendered.contains(&r.needle))
            .cloned();

        Ok(match rule {
            Some(rule) => CommandOutput {
                command: rendered,
                exit_code: rule.exit_code,
                stdout: rule.stdout,
                stderr: rule.stderr,
            },
            None => CommandOutput {
                command: rendered,
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_recording_executor_rules() {
        let executor = RecordingExecutor::new();
        executor.fail_when("vgcreate", 5, "device busy");

        let ok = executor
            .execute(&CommandSpec::new("pvcreate", ["/dev/loop0"]))
            .await
            .unwrap();
        let failed = executor
            .execute(&CommandSpec::new("vgcreate", ["vg0", "/dev/loop0"]))
            .await
            .unwrap();

        assert!(ok.success());
        assert_eq!(failed.exit_code, 5);
        assert_eq!(failed.stderr, "device busy");
        assert_eq!(
            executor.commands(),
            vec!["pvcreate /dev/loop0", "vgcreate vg0 /dev/loop0"]
        );
    }

    #[tokio::test]
    async fn test_store_port_listing_ignores_nested_dirs() {
        let store = InMemoryNvmetStore::new();
        let nqn = Nqn("nqn.test".into());

        store.create_subsystem(&nqn).await.unwrap();
        store.create_port(PortId(4)).await.unwrap();
        store.link_port_to_subsystem(PortId(4), &nqn).await.unwrap();
        store.insert_port(PortId(9));

        let ids: Vec<_> = store.list_port_ids().await.unwrap().into_iter().collect();
        assert_eq!(ids, vec![PortId(4), PortId(9)]);
        assert_eq!(
            store.link_target(PortId(4), &nqn).as_deref(),
            Some("subsystems/nqn.test")
        );
    }

    #[tokio::test]
    async fn test_store_refuses_busy_removals() {
        let store = InMemoryNvmetStore::new();
        let nqn = Nqn("nqn.test".into());

        store.create_subsystem(&nqn).await.unwrap();
        store.create_namespace(&nqn, 1).await.unwrap();
        assert_matches!(store.remove_subsystem(&nqn).await, Err(Error::Internal(_)));

        store.remove_namespace(&nqn, 1).await.unwrap();
        store.remove_subsystem(&nqn).await.unwrap();
        assert!(!store.has_subsystem(&nqn));
    }

    #[tokio::test]
    async fn test_simulated_port_race() {
        let store = InMemoryNvmetStore::new();
        store.simulate_port_races(1);

        assert_matches!(
            store.create_port(PortId(1)).await,
            Err(Error::PortAlreadyExists { port_id: 1 })
        );
        assert!(store.has_port(PortId(1)));
        store.create_port(PortId(2)).await.unwrap();
    }
}
