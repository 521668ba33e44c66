//! Run directory staging.
//!
//! Each run gets its own `{run_dir}/{run_name}.{n}` directory holding the seed
//! record, a private copy of the simulation snapshot, shared libraries, and
//! links to the workarea's waveform configs. Directories are never reused and
//! never removed here; cleanup belongs to the caller.
use crate::config::RunnerConfig;
use anyhow::{anyhow, Context, Result};
use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const SHARED_LIBRARY_EXT: &str = "so";
const WAVE_CONFIG_EXT: &str = "wcfg";

/// A freshly created run directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRun {
    pub path: PathBuf,
    pub iteration: u32,
}

/// Derive the run name from the test name and its plusargs.
///
/// Plusargs are sorted so the name does not depend on the order they were
/// given; `=` becomes `_`. Path separators are also replaced so a plusarg
/// carrying a file path cannot escape the run directory.
pub fn run_name(test_name: &str, plusargs: &[String]) -> String {
    let mut name = test_name.to_string();
    if plusargs.is_empty() {
        return name;
    }
    let mut sorted: Vec<&String> = plusargs.iter().collect();
    sorted.sort();
    let parts: Vec<String> = sorted
        .into_iter()
        .map(|arg| arg.replace('=', "_").replace(['/', '\\'], "_"))
        .collect();
    name.push_str("__");
    name.push_str(&parts.join("__"));
    name
}

/// Stage a run directory for `run_name` and return its location.
pub fn stage_run(config: &RunnerConfig, run_name: &str, seed: u32) -> Result<StagedRun> {
    let snapshot_name = config.simulator.snapshot_dir.as_str();
    let snapshot_src = config.build_dir.join(snapshot_name);
    if !snapshot_src.is_dir() {
        return Err(anyhow!(
            "simulation snapshot not found at {} (has the project been built?)",
            snapshot_src.display()
        ));
    }

    let staged = create_run_dir(&config.run_dir, run_name)?;
    let dir = &staged.path;

    let seed_text = seed.to_string();
    let seed_path = dir.join(&seed_text);
    fs::write(&seed_path, seed_text.as_bytes())
        .with_context(|| format!("write {}", seed_path.display()))?;

    copy_tree(&snapshot_src, &dir.join(snapshot_name))?;

    let libraries = files_with_extension(&config.build_dir, SHARED_LIBRARY_EXT)?;
    for library in &libraries {
        let dest = dir.join(file_name(library)?);
        fs::copy(library, &dest)
            .with_context(|| format!("copy {} to {}", library.display(), dest.display()))?;
    }

    let wave_configs = files_with_extension(&config.workarea, WAVE_CONFIG_EXT)?;
    for wave_config in &wave_configs {
        let target = fs::canonicalize(wave_config)
            .with_context(|| format!("resolve {}", wave_config.display()))?;
        let link = dir.join(file_name(wave_config)?);
        link_file(&target, &link)?;
    }

    tracing::info!(
        run_dir = %dir.display(),
        iteration = staged.iteration,
        seed,
        shared_libraries = libraries.len(),
        wave_configs = wave_configs.len(),
        "staged run directory"
    );
    Ok(staged)
}

/// Create `{base}/{name}.{n}` for the smallest unused `n`, starting at 1.
///
/// Each probe is an exclusive `create_dir`, so two concurrent callers racing
/// for the same name end up with distinct directories.
pub fn create_run_dir(base: &Path, name: &str) -> Result<StagedRun> {
    fs::create_dir_all(base).with_context(|| format!("create {}", base.display()))?;
    let mut iteration: u32 = 1;
    loop {
        let candidate = base.join(format!("{name}.{iteration}"));
        match fs::create_dir(&candidate) {
            Ok(()) => {
                return Ok(StagedRun {
                    path: candidate,
                    iteration,
                })
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                iteration = iteration
                    .checked_add(1)
                    .ok_or_else(|| anyhow!("run directories exhausted for {name}"))?;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("create {}", candidate.display()));
            }
        }
    }
}

/// Recursively copy `src` into `dest`, following symlinks.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).with_context(|| format!("create {}", dest.display()))?;
    let mut entries = fs::read_dir(src)
        .with_context(|| format!("read {}", src.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("read {}", src.display()))?;
    entries.sort_by_key(|entry| entry.file_name());
    for entry in entries {
        let path = entry.path();
        let target = dest.join(entry.file_name());
        if path.is_dir() {
            copy_tree(&path, &target)?;
        } else {
            fs::copy(&path, &target)
                .with_context(|| format!("copy {} to {}", path.display(), target.display()))?;
        }
    }
    Ok(())
}

/// Regular files directly under `dir` with the given extension, sorted.
/// A missing directory yields no files.
fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension() == Some(OsStr::new(ext)) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> Result<&OsStr> {
    path.file_name()
        .ok_or_else(|| anyhow!("{} has no file name", path.display()))
}

#[cfg(unix)]
fn link_file(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)
        .with_context(|| format!("link {} to {}", link.display(), target.display()))
}

#[cfg(not(unix))]
fn link_file(target: &Path, link: &Path) -> Result<()> {
    fs::copy(target, link)
        .map(|_| ())
        .with_context(|| format!("copy {} to {}", target.display(), link.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorConfig;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn layout(root: &Path) -> RunnerConfig {
        let config = RunnerConfig {
            workarea: root.join("workarea"),
            run_dir: root.join("workarea/runs"),
            build_dir: root.join("build"),
            simulator: SimulatorConfig::default(),
        };
        let snapshot = config.build_dir.join("xsim.dir/tb_top_snapshot");
        fs::create_dir_all(&snapshot).expect("create snapshot");
        fs::write(snapshot.join("xsimk"), b"kernel").expect("write kernel");
        fs::write(config.build_dir.join("dpi.so"), b"elf").expect("write so");
        fs::write(config.build_dir.join("notes.txt"), b"skip").expect("write txt");
        fs::write(config.workarea.join("waves.wcfg"), b"<wave/>").expect("write wcfg");
        config
    }

    #[test]
    fn run_name_without_plusargs_is_test_name() {
        assert_eq!(run_name("smoke", &[]), "smoke");
    }

    #[test]
    fn run_name_sorts_and_flattens_plusargs() {
        let name = run_name("smoke", &args(&["NUM=5", "FAST", "ADDR=0x10"]));
        assert_eq!(name, "smoke__ADDR_0x10__FAST__NUM_5");
        assert_eq!(
            name,
            run_name("smoke", &args(&["FAST", "ADDR=0x10", "NUM=5"]))
        );
    }

    #[test]
    fn run_name_flattens_path_separators() {
        assert_eq!(
            run_name("smoke", &args(&["IMAGE=fw/boot.hex"])),
            "smoke__IMAGE_fw_boot.hex"
        );
    }

    #[test]
    fn run_dirs_increment_from_one() {
        let root = tempfile::tempdir().expect("tempdir");
        let base = root.path().join("runs");
        let first = create_run_dir(&base, "smoke").expect("first");
        let second = create_run_dir(&base, "smoke").expect("second");
        let other = create_run_dir(&base, "other").expect("other");
        assert_eq!(first.path, base.join("smoke.1"));
        assert_eq!(second.path, base.join("smoke.2"));
        assert_eq!(second.iteration, 2);
        assert_eq!(other.path, base.join("other.1"));
    }

    #[test]
    fn run_dirs_skip_externally_occupied_slots() {
        let root = tempfile::tempdir().expect("tempdir");
        let base = root.path().join("runs");
        fs::create_dir_all(base.join("smoke.1")).expect("occupy 1");
        fs::write(base.join("smoke.2"), b"file").expect("occupy 2");
        let staged = create_run_dir(&base, "smoke").expect("create");
        assert_eq!(staged.path, base.join("smoke.3"));
        assert_eq!(staged.iteration, 3);
    }

    #[test]
    fn stage_run_populates_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(root.path().join("workarea")).expect("workarea");
        let config = layout(root.path());

        let staged = stage_run(&config, "smoke", 1234).expect("stage");
        let dir = &staged.path;
        assert_eq!(dir, &config.run_dir.join("smoke.1"));
        assert_eq!(
            fs::read_to_string(dir.join("1234")).expect("seed file"),
            "1234"
        );
        assert_eq!(
            fs::read(dir.join("xsim.dir/tb_top_snapshot/xsimk")).expect("snapshot copy"),
            b"kernel"
        );
        assert_eq!(fs::read(dir.join("dpi.so")).expect("so copy"), b"elf");
        assert!(!dir.join("notes.txt").exists());

        let link = dir.join("waves.wcfg");
        let meta = fs::symlink_metadata(&link).expect("wcfg link");
        if cfg!(unix) {
            assert!(meta.file_type().is_symlink());
        }
        assert_eq!(fs::read(&link).expect("read through link"), b"<wave/>");
    }

    #[test]
    fn stage_run_without_wave_configs_is_fine() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(root.path().join("workarea")).expect("workarea");
        let config = layout(root.path());
        fs::remove_file(config.workarea.join("waves.wcfg")).expect("remove wcfg");

        let staged = stage_run(&config, "smoke", 7).expect("stage");
        assert!(!staged.path.join("waves.wcfg").exists());
    }

    #[test]
    fn stage_run_requires_snapshot() {
        let root = tempfile::tempdir().expect("tempdir");
        let config = RunnerConfig {
            workarea: root.path().to_path_buf(),
            run_dir: root.path().join("runs"),
            build_dir: root.path().join("build"),
            simulator: SimulatorConfig::default(),
        };
        let err = stage_run(&config, "smoke", 1).expect_err("snapshot missing");
        assert!(err.to_string().contains("simulation snapshot not found"));
        assert!(!config.run_dir.join("smoke.1").exists());
    }
}
