/*!
 * Local Account
 * Disk-backed account for development and testing
 */

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use super::types::{AccountError, AccountResult};
use super::Account;
use crate::config::{BuildContext, ConfigError, ConfigResult, Params};
use crate::vfs::{FileSystem, FileSystemBuilder, LocalFS, VfsResult};

pub const SERVICE: &str = "local";

const SAMPLE_TEXT: &str = "# The Zen of Python
Beautiful is better than ugly.
Explicit is better than implicit.
Simple is better than complex.
Complex is better than complicated.
Flat is better than nested.
Sparse is better than dense.
Readability counts.
Special cases aren't special enough to break the rules.
Although practicality beats purity.
Errors should never pass silently.
Unless explicitly silenced.
In the face of ambiguity, refuse the temptation to guess.
There should be one-- and preferably only one --obvious way to do it.
Although that way may not be obvious at first unless you're Dutch.
Now is better than never.
Although never is often better than *right* now.
If the implementation is hard to explain, it's a bad idea.
If the implementation is easy to explain, it may be a good idea.
Namespaces are one honking great idea -- let's do more of those!";

pub struct LocalAccount {
    unique_id: String,
    fs: Arc<LocalFS>,
    seed_sample: bool,
    authenticated: Mutex<bool>,
}

impl LocalAccount {
    pub fn new(unique_id: impl Into<String>, fs: LocalFS) -> Self {
        Self {
            unique_id: unique_id.into(),
            fs: Arc::new(fs),
            seed_sample: false,
            authenticated: Mutex::new(false),
        }
    }

    /// Populate an empty backend with a small sample tree on authentication
    pub fn with_sample_tree(mut self, seed: bool) -> Self {
        self.seed_sample = seed;
        self
    }

    pub fn local_fs(&self) -> &Arc<LocalFS> {
        &self.fs
    }

    fn seed(&self) -> VfsResult<()> {
        let fs = &self.fs;
        let _guard = fs.lock();
        if !fs.list_dir("/")?.is_empty() {
            return Ok(());
        }

        upload(fs.as_ref(), "/file1.txt", SAMPLE_TEXT.as_bytes())?;
        fs.make_dir("/dir1")?;
        fs.make_dir("/dir2")?;
        upload(fs.as_ref(), "/dir2/file2.txt", SAMPLE_TEXT.as_bytes())?;
        fs.make_dir("/dir2/subdir1")?;
        info!(account = %self.unique_id, "sample tree created");
        Ok(())
    }
}

fn upload(fs: &dyn FileSystem, path: &str, data: &[u8]) -> VfsResult<()> {
    let id = fs.create_new_file()?;
    let written = fs
        .write_to_new_file(id, data)
        .and_then(|_| fs.commit_new_file(id, path));
    if written.is_err() {
        let _ = fs.flush_new_file(id);
    }
    written
}

impl Account for LocalAccount {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn authenticate(&self) -> AccountResult<()> {
        let mut authenticated = self.authenticated.lock();
        if *authenticated {
            return Ok(());
        }
        if self.seed_sample {
            self.seed().map_err(|source| AccountError::Storage {
                account: self.unique_id.clone(),
                source,
            })?;
        }
        *authenticated = true;
        Ok(())
    }

    fn file_system(&self) -> Arc<dyn FileSystem> {
        self.fs.clone()
    }
}

/// Registry factory. Recognised parameters: `base_dir` (relative paths
/// resolve against the context directory, default `<id>`), `capacity`,
/// `reset` and `sample`.
pub(crate) fn from_params(
    unique_id: &str,
    params: &mut Params,
    context: &BuildContext,
) -> ConfigResult<Arc<dyn Account>> {
    let base_dir = context
        .base_dir
        .join(params.take("base_dir").unwrap_or_else(|| unique_id.to_string()));
    let mut builder = LocalFS::builder(base_dir);
    if let Some(capacity) = params.take_parsed::<u64>("capacity")? {
        builder = builder.capacity(capacity);
    }
    if let Some(reset) = params.take_parsed::<bool>("reset")? {
        builder = builder.reset(reset);
    }
    let sample = params.take_parsed::<bool>("sample")?.unwrap_or(true);
    params.finish()?;

    let fs = builder
        .build()
        .map_err(|e| ConfigError::construction(params.owner(), e))?;
    Ok(Arc::new(LocalAccount::new(unique_id, fs).with_sample_tree(sample)))
}
