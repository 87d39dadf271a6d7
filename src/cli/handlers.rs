use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use homedir::my_home;
use ks::semantic::STORE_FILE_NAME;
use ks::{KnowledgeError, KnowledgeStore, SearchHit, StoreConfig};

/// Store opened from a base directory.
pub struct Workspace {
    pub base_path: PathBuf,
    pub store_path: PathBuf,
    pub store: KnowledgeStore,
}

impl Workspace {
    /// Load `config.yaml` and, if present, `store.bin` from `base_path`.
    pub fn open(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path).with_context(|| {
            format!("Failed to create store directory {}", base_path.display())
        })?;

        let config = StoreConfig::load_with(&base_path).map_err(KnowledgeError::from)?;
        let store = KnowledgeStore::new(config)?;

        let store_path = base_path.join(STORE_FILE_NAME);
        if store_path.exists() {
            store
                .load(&store_path)
                .with_context(|| format!("Failed to load {}", store_path.display()))?;
        } else {
            log::debug!("No snapshot at {}, starting empty", store_path.display());
        }

        Ok(Self {
            base_path,
            store_path,
            store,
        })
    }

    pub fn save(&self) -> Result<()> {
        self.store
            .save(&self.store_path)
            .with_context(|| format!("Failed to save {}", self.store_path.display()))
    }
}

/// Base directory: explicit flag, then `KS_BASE_PATH`, then `~/.local/share/ks`.
pub fn resolve_base_path(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }

    if let Ok(path) = std::env::var("KS_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .ok()
        .flatten()
        .context("Could not determine home directory, set KS_BASE_PATH")?;
    Ok(home.join(".local/share/ks"))
}

pub fn handle_add(files: &[PathBuf], workspace: &Workspace) -> Result<()> {
    let mut total = 0;
    for file in files {
        let ids = workspace.store.add_file(file)?;
        println!("{}: {} chunks indexed", file.display(), ids.len());
        total += ids.len();
    }

    workspace.save()?;
    log::info!("Indexed {total} chunks from {} files", files.len());

    Ok(())
}

pub fn handle_search(query: &str, k: Option<usize>, json: bool, workspace: &Workspace) -> Result<()> {
    let k = k.unwrap_or(workspace.store.config().default_k);
    let hits = workspace.store.search(query, k)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No documents found");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!("{}", format_hit(rank + 1, hit));
    }

    Ok(())
}

pub fn handle_info(workspace: &Workspace) -> Result<()> {
    let store = &workspace.store;
    let config = store.config();

    println!("base path:  {}", workspace.base_path.display());
    println!("store file: {}", display_if_exists(&workspace.store_path));
    println!("documents:  {}", store.len());
    println!("fitted:     {}", store.is_fitted());
    println!("dimensions: {}", store.dimensions());
    println!("analyzer:   {:?}", config.analyzer);
    println!("cache size: {}", config.cache_capacity);

    Ok(())
}

fn display_if_exists(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not created yet)", path.display())
    }
}

fn format_hit(rank: usize, hit: &SearchHit) -> String {
    let metadata = hit
        .metadata
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ");

    format!("{rank}. #{} d={:.4} {metadata}", hit.id, hit.distance)
}
