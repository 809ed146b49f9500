//! Config file discovery and registry assembly.
//!
//! The loader performs no kernel-facing I/O; it only reads config files
//! and builds the instance registry, so the whole phase can be tested
//! against scratch directories.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::directive::DirectiveKind;
use super::parser::{parse_line, ConfigError};
use crate::instance::{Instance, Registry};

/// Directory scanned for instance config files.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/fdr.d";

/// Required config file name suffix.
pub const CONFIG_SUFFIX: &str = ".conf";

/// True when the file name ends exactly in [`CONFIG_SUFFIX`].
///
/// A backup like `foo.conf.OLD` merely contains the suffix and is
/// excluded.
pub fn is_config_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(CONFIG_SUFFIX))
}

/// Collect config files from one directory, sorted by name.
pub fn discover_config_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_config_file(path))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Parse every config file and build the instance registry.
///
/// A `instance` directive starts a new instance and becomes the
/// attachment target for the directives that follow it within the same
/// file. Directives appearing before any `instance` line have nothing to
/// attach to and are dropped with a warning. Any [`ConfigError`] aborts
/// the whole load.
pub fn load_config_files<P: AsRef<Path>>(paths: &[P]) -> Result<Registry, ConfigError> {
    let mut registry = Registry::new();

    for path in paths {
        let path = path.as_ref();
        info!(file = %path.display(), "reading config file");

        let file = File::open(path).map_err(|source| ConfigError::Io {
            file: path.to_path_buf(),
            source,
        })?;

        // The attachment target does not carry across files.
        let mut current: Option<usize> = None;

        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let lineno = (idx + 1) as u32;
            let line = line.map_err(|source| ConfigError::Io {
                file: path.to_path_buf(),
                source,
            })?;

            let Some(parsed) = parse_line(&line, path, lineno)? else {
                continue;
            };

            if parsed.directive.kind == DirectiveKind::DefineInstance {
                let mut instance = Instance::new(&parsed.directive.target);
                instance.apply_fields(&parsed.fields);
                instance.directives.push(parsed.directive);
                registry.push(instance);
                current = Some(registry.len() - 1);
                continue;
            }

            match current.and_then(|_| registry.last_mut()) {
                Some(instance) => {
                    instance.apply_fields(&parsed.fields);
                    instance.directives.push(parsed.directive);
                }
                None => {
                    warn!(
                        file = %path.display(),
                        line = lineno,
                        verb = ?parsed.directive.kind,
                        "directive before any instance, ignoring"
                    );
                }
            }
        }
    }

    debug!(instances = registry.len(), "config load complete");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_is_config_file_requires_exact_suffix() {
        assert!(is_config_file(Path::new("/etc/fdr.d/io.conf")));
        assert!(!is_config_file(Path::new("/etc/fdr.d/io.conf.OLD")));
        assert!(!is_config_file(Path::new("/etc/fdr.d/io.confx")));
        assert!(!is_config_file(Path::new("/etc/fdr.d/README")));
    }

    #[test]
    fn test_discover_skips_backups_and_sorts() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "b.conf", "");
        write_config(&dir, "a.conf", "");
        write_config(&dir, "a.conf.bak", "");
        write_config(&dir, "notes.txt", "");

        let paths = discover_config_files(dir.path()).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a.conf", "b.conf"]);
    }

    #[test]
    fn test_load_builds_instance_with_directives_in_order() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "fdr.conf",
            "# capture sched events\n\
             instance fdr 4096k\n\
             modprobe dummy_mod\n\
             enable sched/sched_switch\n\
             disable sched/sched_migrate_task\n\
             minfree 10\n\
             saveto /var/log/fdr.log 10m\n",
        );

        let registry = load_config_files(&[path]).unwrap();
        assert_eq!(registry.len(), 1);

        let inst = registry.iter().next().unwrap();
        assert_eq!(inst.name, "fdr");
        assert_eq!(inst.buffer_size, Some(4096 * 1024));
        assert_eq!(inst.max_file_size, 10 * 1024 * 1024);
        assert_eq!(inst.min_free_percent, 10);

        let kinds: Vec<_> = inst.directives.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            [
                DirectiveKind::DefineInstance,
                DirectiveKind::LoadModule,
                DirectiveKind::Enable,
                DirectiveKind::Disable,
                DirectiveKind::MinFree,
                DirectiveKind::SaveTo,
            ]
        );

        let targets: Vec<_> = inst.directives.iter().map(|d| d.target.as_str()).collect();
        assert_eq!(
            targets,
            [
                "fdr",
                "dummy_mod",
                "sched/sched_switch",
                "sched/sched_migrate_task",
                "10",
                "/var/log/fdr.log",
            ]
        );
    }

    #[test]
    fn test_multiple_instances_in_one_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "multi.conf",
            "instance first\n\
             enable sched/all\n\
             instance second\n\
             enable irq/all\n",
        );

        let registry = load_config_files(&[path]).unwrap();
        assert_eq!(registry.len(), 2);

        let instances: Vec<_> = registry.iter().collect();
        assert_eq!(instances[0].name, "first");
        assert_eq!(instances[0].directives.len(), 2);
        assert_eq!(instances[1].name, "second");
        assert_eq!(instances[1].directives[1].target, "irq/all");
    }

    #[test]
    fn test_directive_before_instance_is_dropped() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "orphan.conf",
            "enable sched/sched_switch\n\
             instance fdr\n\
             enable irq/all\n",
        );

        let registry = load_config_files(&[path]).unwrap();
        let inst = registry.iter().next().unwrap();
        assert_eq!(inst.directives.len(), 2);
        assert_eq!(inst.directives[1].target, "irq/all");
    }

    #[test]
    fn test_attachment_does_not_carry_across_files() {
        let dir = TempDir::new().unwrap();
        let first = write_config(&dir, "a.conf", "instance fdr\n");
        let second = write_config(&dir, "b.conf", "enable sched/all\n");

        let registry = load_config_files(&[first, second]).unwrap();
        let inst = registry.iter().next().unwrap();
        // The orphaned enable in b.conf must not attach to fdr from a.conf.
        assert_eq!(inst.directives.len(), 1);
    }

    #[test]
    fn test_unknown_verb_aborts_load() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "bad.conf", "instance fdr\nfrobnicate x\n");

        let err = load_config_files(&[path]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownVerb { line: 2, .. }));
    }

    #[test]
    fn test_missing_slash_aborts_load() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "bad.conf", "instance fdr\nenable sched_switch\n");

        let err = load_config_files(&[path]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSlash { line: 2, .. }));
    }

    #[test]
    fn test_missing_file_aborts_load() {
        let err = load_config_files(&[Path::new("/nonexistent/x.conf")]).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
