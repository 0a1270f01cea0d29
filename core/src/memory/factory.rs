use crate::memory::FileMemory;
use crate::traits::Memory;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

pub async fn create_memory(workspace_dir: &Path) -> Result<Arc<dyn Memory>> {
    Ok(Arc::new(FileMemory::open(workspace_dir).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn factory_file() {
        let tmp = TempDir::new().unwrap();
        let mem = create_memory(tmp.path()).await.unwrap();
        assert_eq!(mem.name(), "file");
    }
}
