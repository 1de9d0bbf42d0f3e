use std::fs;
use std::io::Write;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use serde::Serialize;
use tempfile::Builder;
use tracing::debug;

use crate::domain::{GeneRef, Kingdom, Organism, ProkaryoteDomain};
use crate::error::KiraError;
use crate::stats::{Gene, Sum};

#[derive(Debug, Clone, Serialize)]
pub struct OrganismRecord {
    pub organism: Organism,
    pub genes: Vec<Gene>,
    pub missing: Vec<GeneRef>,
    pub sums: Vec<Sum>,
    pub processed_at: String,
}

impl OrganismRecord {
    pub fn new(organism: Organism, genes: Vec<Gene>, missing: Vec<GeneRef>, sums: Vec<Sum>) -> Self {
        Self {
            organism,
            genes,
            missing,
            sums,
            processed_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn relative_path(&self) -> Utf8PathBuf {
        self.organism
            .path
            .clone()
            .unwrap_or_else(|| self.organism.default_path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredNode {
    pub name: String,
    pub path: Utf8PathBuf,
    pub is_file: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StoredNode>,
}

impl StoredNode {
    fn directory(name: &str, path: Utf8PathBuf, children: Vec<StoredNode>) -> Self {
        Self {
            name: name.to_string(),
            path,
            is_file: false,
            children,
        }
    }

    pub fn file_count(&self) -> usize {
        if self.is_file {
            1
        } else {
            self.children.iter().map(StoredNode::file_count).sum()
        }
    }
}

pub trait ResultStore: Send + Sync {
    fn save(&self, record: &OrganismRecord) -> Result<(), KiraError>;
    fn tree(&self, kingdom: Kingdom) -> Result<StoredNode, KiraError>;
}

#[derive(Debug, Clone)]
pub struct JsonStore {
    root: Utf8PathBuf,
}

impl JsonStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn record_path(&self, record: &OrganismRecord) -> Utf8PathBuf {
        let relative = record.relative_path();
        let file_name = relative.file_name().unwrap_or("organism");
        self.root.join(&relative).join(format!("{file_name}.json"))
    }

    pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), KiraError> {
        let parent = path
            .parent()
            .ok_or_else(|| KiraError::Filesystem(format!("invalid record path {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("{parent}: {err}")))?;
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| KiraError::Persistence(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("kira-cu-record")
            .suffix(".tmp")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| KiraError::Filesystem(format!("{path}: {err}")))?;
        temp.persist(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("{path}: {err}")))?;
        Ok(())
    }
}

impl ResultStore for JsonStore {
    fn save(&self, record: &OrganismRecord) -> Result<(), KiraError> {
        let path = self.record_path(record);
        Self::write_json_atomic(&path, record)?;
        debug!(path = %path, "stored organism");
        Ok(())
    }

    /// Prokaryote results live under the Bacteria and Archaea directories, so
    /// the Prokaryotes tree groups both.
    fn tree(&self, kingdom: Kingdom) -> Result<StoredNode, KiraError> {
        if kingdom == Kingdom::Prokaryotes {
            let children = [ProkaryoteDomain::Bacteria, ProkaryoteDomain::Archaea]
                .into_iter()
                .map(|domain| self.tree(domain.kingdom()))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(StoredNode::directory(
                kingdom.label(),
                self.root.join(kingdom.label()),
                children,
            ));
        }
        let path = self.root.join(kingdom.label());
        if !path.as_std_path().is_dir() {
            return Ok(StoredNode::directory(kingdom.label(), path, Vec::new()));
        }
        build_node(&path)
    }
}

fn build_node(path: &Utf8Path) -> Result<StoredNode, KiraError> {
    let name = path.file_name().unwrap_or(path.as_str()).to_string();
    if !path.as_std_path().is_dir() {
        return Ok(StoredNode {
            name,
            path: path.to_path_buf(),
            is_file: true,
            children: Vec::new(),
        });
    }
    let mut children = Vec::new();
    for entry in read_dir_sorted(path.as_std_path())? {
        let child = Utf8PathBuf::from_path_buf(entry)
            .map_err(|entry| KiraError::Filesystem(format!("non-utf8 path {}", entry.display())))?;
        if child.extension() == Some("tmp") {
            continue;
        }
        children.push(build_node(&child)?);
    }
    Ok(StoredNode {
        name,
        path: path.to_path_buf(),
        is_file: false,
        children,
    })
}

fn read_dir_sorted(root: &Path) -> Result<Vec<std::path::PathBuf>, KiraError> {
    let mut items = Vec::new();
    let entries = fs::read_dir(root).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|err| KiraError::Filesystem(err.to_string()))?;
        items.push(entry.path());
    }
    items.sort();
    Ok(items)
}
