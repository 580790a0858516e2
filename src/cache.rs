//! On-disk bytecode cache, keyed by a digest of the source bytes. See
//! `spec` §4.6, §6.
//!
//! Grounded in the Python original's `services/cache_manager.py`
//! (digest-keyed `.bin` files, age-based cleanup) using the
//! `serde`/`bincode`/`sha2` combination `navicore-cem3`'s `runtime` crate
//! depends on for its own compiled-artifact cache.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::compiler::CompiledProgram;
use crate::object::FunctionObject;
use crate::opcode::Chunk;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope {
  version: u32,
  digest: [u8; 32],
  top_level: Chunk,
  functions: Vec<(String, FunctionObject)>,
}

/// A directory of digest-named `.bin` files, each a serialized
/// `(Chunk, function table)` pair for one source text.
pub struct BytecodeCache {
  dir: PathBuf,
}

impl BytecodeCache {
  pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
    let dir = dir.into();
    fs::create_dir_all(&dir)?;
    Ok(Self { dir })
  }

  fn digest(source: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.finalize().into()
  }

  fn path_for(&self, digest: &[u8; 32]) -> PathBuf {
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    self.dir.join(format!("{hex}.bin"))
  }

  /// Looks up a cached compiled program for `source`. Any read failure
  /// (missing file, corrupt envelope, version mismatch) is non-fatal: the
  /// caller recompiles.
  pub fn get(&self, source: &str) -> Option<CompiledProgram> {
    let digest = Self::digest(source);
    let path = self.path_for(&digest);
    let bytes = fs::read(&path).ok()?;
    match bincode::deserialize::<Envelope>(&bytes) {
      Ok(env) if env.version == FORMAT_VERSION && env.digest == digest => Some(CompiledProgram {
        top_level: env.top_level,
        functions: env
          .functions
          .into_iter()
          .map(|(name, f)| (name, Rc::new(f)))
          .collect(),
      }),
      Ok(_) => {
        warn!(path = %path.display(), "cache entry is stale or from a different format version");
        None
      }
      Err(error) => {
        warn!(path = %path.display(), %error, "cache read error, recompiling");
        None
      }
    }
  }

  /// Writes `program` for `source`, atomically (temp file then rename).
  pub fn put(&self, source: &str, program: &CompiledProgram) -> io::Result<()> {
    let digest = Self::digest(source);
    let env = Envelope {
      version: FORMAT_VERSION,
      digest,
      top_level: program.top_level.clone(),
      functions: program
        .functions
        .iter()
        .map(|(name, f)| (name.clone(), (**f).clone()))
        .collect(),
    };
    let bytes = bincode::serialize(&env).expect("compiled program is always serializable");
    let path = self.path_for(&digest);
    let tmp = path.with_extension("bin.tmp");
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, &path)?;
    Ok(())
  }

  /// Removes entries whose file modification time is older than `max_age`.
  /// Returns the number of files removed.
  pub fn cleanup(&self, max_age: Duration) -> io::Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in fs::read_dir(&self.dir)? {
      let entry = entry?;
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some("bin") {
        continue;
      }
      let modified = entry.metadata()?.modified()?;
      if now.duration_since(modified).unwrap_or_default() > max_age {
        fs::remove_file(&path)?;
        removed += 1;
      }
    }
    Ok(removed)
  }

  pub fn clear(&self) -> io::Result<()> {
    for entry in fs::read_dir(&self.dir)? {
      fs::remove_file(entry?.path())?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compiler::compile;
  use crate::lexer::lex;
  use crate::parser::parse;

  fn compile_src(src: &str) -> CompiledProgram {
    let tokens = lex(src).unwrap();
    let program = parse(tokens).unwrap();
    compile(&program, src).unwrap()
  }

  fn temp_cache_dir(label: &str) -> PathBuf {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("mira-cache-test-{label}-{}-{n}", std::process::id()))
  }

  #[test]
  fn round_trips_through_disk() {
    let dir = temp_cache_dir("roundtrip");
    let cache = BytecodeCache::new(&dir).unwrap();
    let src = "let a = 1\nfunc f(x):\n    return x + 1\n";
    let compiled = compile_src(src);
    cache.put(src, &compiled).unwrap();

    let reloaded = cache.get(src).expect("cache hit");
    assert_eq!(reloaded.top_level.code.len(), compiled.top_level.code.len());
    assert!(reloaded.functions.contains_key("f"));

    fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn miss_on_different_source() {
    let dir = temp_cache_dir("miss");
    let cache = BytecodeCache::new(&dir).unwrap();
    cache.put("let a = 1\n", &compile_src("let a = 1\n")).unwrap();
    assert!(cache.get("let a = 2\n").is_none());
    fs::remove_dir_all(&dir).ok();
  }
}
