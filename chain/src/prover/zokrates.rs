//! ZoKrates-backed proving toolchain.
//!
//! This implementation of [`Prover`] shells out to the `zokrates` CLI. A
//! circuit lives in its own directory containing a single `.zok` source
//! file next to the compiled artefacts (`out`, `abi.json`, `proving.key`,
//! `verification.key`); the directory is addressed on-chain by the SHA-256
//! of the source file.
//!
//! Witness and proof files for one request are written into a
//! [`tempfile::TempDir`] scoped to that request, so they are removed on all
//! exit paths, including failure.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;
use tracing::{debug, warn};

use super::{blob_matches_binding, CircuitRegistry, Prover, ProverError};
use crate::types::block::BindingTag;
use crate::types::{Hash256, ProofBlob};

/// File extension of a circuit source file.
const CIRCUIT_SOURCE_EXTENSION: &str = "zok";

/// The toolchain line this node is written against.
const SUPPORTED_MAJOR: u64 = 0;
const SUPPORTED_MINOR: u64 = 8;

/// Prover/verifier that drives the `zokrates` binary.
#[derive(Clone, Debug)]
pub struct ZokratesProver {
    binary: PathBuf,
}

impl Default for ZokratesProver {
    fn default() -> Self {
        Self::new()
    }
}

impl ZokratesProver {
    /// Uses the `zokrates` binary from `PATH`.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("zokrates"),
        }
    }

    /// Uses an explicit toolchain binary.
    pub fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    /// Queries the toolchain version and checks it against the supported
    /// 0.8 line. Returns the reported version string on success.
    pub fn check_version(&self) -> Result<String, ProverError> {
        let output = self
            .command()
            .arg("--version")
            .output()
            .map_err(|e| ProverError::Launch(format!("zokrates --version: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = parse_version(&stdout).ok_or_else(|| {
            ProverError::Protocol(format!("could not parse version from {stdout:?}"))
        })?;

        let (major, minor, _) = version;
        if major != SUPPORTED_MAJOR || minor < SUPPORTED_MINOR {
            return Err(ProverError::Protocol(format!(
                "zokrates {major}.{minor} is incompatible, expected the \
                 {SUPPORTED_MAJOR}.{SUPPORTED_MINOR} line"
            )));
        }
        Ok(format!("{}.{}.{}", version.0, version.1, version.2))
    }

    /// Walks `root` and prepares every circuit subdirectory found.
    ///
    /// A usable subdirectory contains exactly one `.zok` source file; it is
    /// compiled and key setup is run in place, and the directory is
    /// registered under the SHA-256 of its source. Directories that fail
    /// any step are skipped with a warning, matching how an operator keeps
    /// a node up when a single circuit is broken.
    pub fn discover(&self, root: &Path) -> CircuitRegistry {
        let mut registry = CircuitRegistry::new();

        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("circuits: cannot read circuit root {}: {e}", root.display());
                return registry;
            }
        };

        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }

            let sources = find_files_with_extension(&dir, CIRCUIT_SOURCE_EXTENSION);
            let source = match sources.as_slice() {
                [single] => single.clone(),
                [] => {
                    warn!(
                        "circuits: expected a single .zok file in {}, found none, ignoring",
                        dir.display()
                    );
                    continue;
                }
                _ => {
                    warn!(
                        "circuits: expected a single .zok file in {}, found multiple, ignoring",
                        dir.display()
                    );
                    continue;
                }
            };

            if let Err(e) = self.prepare_circuit(&dir, &source) {
                warn!("circuits: failed to prepare {}: {e}, ignoring", dir.display());
                continue;
            }

            match file_hash(&source) {
                Ok(circuit_hash) => {
                    debug!(
                        "circuits: registered {} as {}",
                        dir.display(),
                        circuit_hash.to_hex()
                    );
                    registry.insert(circuit_hash, dir);
                }
                Err(e) => {
                    warn!("circuits: failed to hash {}: {e}, ignoring", source.display());
                }
            }
        }

        registry
    }

    fn prepare_circuit(&self, dir: &Path, source: &Path) -> Result<(), ProverError> {
        let compile = self
            .command()
            .current_dir(dir)
            .args(["compile", "-i"])
            .arg(source)
            .output()
            .map_err(|e| ProverError::Launch(format!("zokrates compile: {e}")))?;
        expect_success("compile", &compile)?;

        let setup = self
            .command()
            .current_dir(dir)
            .arg("setup")
            .output()
            .map_err(|e| ProverError::Launch(format!("zokrates setup: {e}")))?;
        expect_success("setup", &setup)?;

        Ok(())
    }

    /// Reads the constraint count of a prepared circuit via
    /// `zokrates inspect`.
    pub fn constraint_count(&self, circuit_dir: &Path) -> Result<u64, ProverError> {
        let output = self
            .command()
            .current_dir(circuit_dir)
            .args(["inspect", "-i", "out"])
            .output()
            .map_err(|e| ProverError::Launch(format!("zokrates inspect: {e}")))?;
        expect_success("inspect", &output)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_constraint_count(&stdout).ok_or_else(|| {
            ProverError::Protocol("inspect output carries no constraint_count".to_string())
        })
    }
}

impl Prover for ZokratesProver {
    fn generate(
        &self,
        circuit_dir: &Path,
        inputs: &str,
        binding: &BindingTag,
    ) -> Result<ProofBlob, ProverError> {
        let scratch = TempDir::new()
            .map_err(|e| ProverError::Launch(format!("cannot create scratch dir: {e}")))?;
        let witness_path = scratch.path().join("witness");
        let proof_path = scratch.path().join("proof.json");

        let mut compute = self.command();
        compute
            .current_dir(circuit_dir)
            .args(["compute-witness", "-i", "out", "-s", "abi.json", "-o"])
            .arg(&witness_path)
            .arg("-a");
        for argument in inputs.split_whitespace() {
            compute.arg(argument);
        }
        compute.arg(binding.to_decimal_string());

        let output = compute
            .output()
            .map_err(|e| ProverError::Launch(format!("zokrates compute-witness: {e}")))?;
        expect_success("compute-witness", &output)?;

        let output = self
            .command()
            .current_dir(circuit_dir)
            .args(["generate-proof", "-i", "out", "-p", "proving.key", "-w"])
            .arg(&witness_path)
            .arg("-j")
            .arg(&proof_path)
            .output()
            .map_err(|e| ProverError::Launch(format!("zokrates generate-proof: {e}")))?;
        expect_success("generate-proof", &output)?;

        let blob = fs::read_to_string(&proof_path)
            .map_err(|e| ProverError::Protocol(format!("cannot read proof output: {e}")))?;
        Ok(ProofBlob(blob))
        // `scratch` drops here, removing witness and proof files.
    }

    fn verify(
        &self,
        circuit_dir: &Path,
        blob: &ProofBlob,
        _inputs: &str,
        binding: &BindingTag,
    ) -> Result<bool, ProverError> {
        // The binding must sit in the last-but-one public-input slot;
        // anything else means the proof was made for different block
        // contents.
        if !blob_matches_binding(blob, binding)? {
            return Ok(false);
        }

        let scratch = TempDir::new()
            .map_err(|e| ProverError::Launch(format!("cannot create scratch dir: {e}")))?;
        let proof_path = scratch.path().join("proof.json");
        fs::write(&proof_path, blob.as_str())
            .map_err(|e| ProverError::Launch(format!("cannot stage proof blob: {e}")))?;

        let output = self
            .command()
            .current_dir(circuit_dir)
            .args(["verify", "-v", "verification.key", "-j"])
            .arg(&proof_path)
            .output()
            .map_err(|e| ProverError::Launch(format!("zokrates verify: {e}")))?;

        // A failed verification is an honest `false`, not an error.
        Ok(output.status.success())
    }
}

fn expect_success(step: &str, output: &Output) -> Result<(), ProverError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = stderr.lines().last().unwrap_or("no diagnostic output");
    Err(ProverError::Execution(format!("{step}: {detail}")))
}

fn find_files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut result = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == extension) {
                result.push(path);
            }
        }
    }
    result.sort();
    result
}

/// Streams a file through SHA-256, producing the circuit's on-chain hash.
fn file_hash(path: &Path) -> Result<Hash256, std::io::Error> {
    use sha2::{Digest, Sha256};

    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 4096];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(Hash256(hasher.finalize().into()))
}

/// Picks the first `major.minor.patch` triple out of a version banner.
fn parse_version(banner: &str) -> Option<(u64, u64, u64)> {
    for token in banner.split_whitespace() {
        let parts: Vec<&str> = token.trim_matches(|c: char| !c.is_ascii_digit()).split('.').collect();
        if parts.len() == 3 {
            if let (Ok(major), Ok(minor), Ok(patch)) =
                (parts[0].parse(), parts[1].parse(), parts[2].parse())
            {
                return Some((major, minor, patch));
            }
        }
    }
    None
}

/// Extracts `constraint_count: N` from `zokrates inspect` output.
fn parse_constraint_count(output: &str) -> Option<u64> {
    for line in output.lines() {
        if let Some(rest) = line.trim().strip_prefix("constraint_count:") {
            if let Ok(count) = rest.trim().parse() {
                return Some(count);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_version_from_banner() {
        assert_eq!(parse_version("ZoKrates 0.8.8"), Some((0, 8, 8)));
        assert_eq!(parse_version("zokrates version: 0.8.2\n"), Some((0, 8, 2)));
        assert_eq!(parse_version("no digits here"), None);
    }

    #[test]
    fn parse_constraint_count_from_inspect_output() {
        let output = "curve: bn128\nscheme: g16\nconstraint_count: 3\n";
        assert_eq!(parse_constraint_count(output), Some(3));
        assert_eq!(parse_constraint_count("nothing relevant"), None);
    }

    #[test]
    fn file_hash_matches_direct_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("circuit.zok");
        fs::write(&path, b"def main() { return; }").unwrap();

        assert_eq!(
            file_hash(&path).unwrap(),
            Hash256::compute(b"def main() { return; }")
        );
    }

    #[test]
    fn discover_skips_directories_without_a_source() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("empty")).unwrap();
        fs::write(root.path().join("stray-file"), b"ignored").unwrap();

        let prover = ZokratesProver::new();
        let registry = prover.discover(root.path());
        assert!(registry.is_empty());
    }

    #[test]
    fn find_files_filters_on_extension() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.zok"), b"a").unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();

        let found = find_files_with_extension(dir.path(), "zok");
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("a.zok"));
    }
}
