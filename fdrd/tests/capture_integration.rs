//! End-to-end flow: configuration files through directive dispatch to a
//! captured output file, against a scratch tracing root.
//!
//! The kernel normally creates `trace_pipe` and the event control files
//! when an instance directory is made; the tests plant them up front.
//! A regular file stands in for `trace_pipe`: the capture loop reads it
//! to end of stream and exits, which is exactly the EOF path.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use fdrd::capture::RotationSignal;
use fdrd::config::{discover_config_files, load_config_files};
use fdrd::supervisor::{spawn_context, Runtime};
use fdrd::tracefs::TraceFs;

fn plant_instance_controls(tracefs: &TraceFs, instance: &str, trace_data: &[u8]) {
    let dir = tracefs.instance_dir(instance);
    fs::create_dir_all(&dir).unwrap();
    fs::write(tracefs.trace_pipe_path(instance), trace_data).unwrap();
    fs::write(tracefs.buffer_size_path(instance), "").unwrap();

    let enable = tracefs.event_enable_path(instance, "sched", Some("sched_switch"));
    fs::create_dir_all(enable.parent().unwrap()).unwrap();
    fs::write(&enable, "0").unwrap();
}

fn write_config(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

#[test]
fn test_config_to_captured_output() {
    let config_dir = TempDir::new().unwrap();
    let tracing_root = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("fdr.log");

    let tracefs = TraceFs::new(tracing_root.path());
    plant_instance_controls(&tracefs, "fdr", b"sched_switch: prev=cc1 next=swapper\n");

    write_config(
        config_dir.path(),
        "fdr.conf",
        &format!(
            "# capture scheduler activity\n\
             instance fdr 64k\n\
             enable sched/sched_switch\n\
             minfree 10\n\
             saveto {} 1m\n",
            output.display()
        ),
    );
    // Wrong suffix; must be ignored entirely.
    write_config(config_dir.path(), "ignored.conf.bak", "instance ghost\n");

    let files = discover_config_files(config_dir.path()).unwrap();
    assert_eq!(files.len(), 1);
    let registry = load_config_files(&files).unwrap();
    assert_eq!(registry.len(), 1);

    let instance = registry.into_instances().remove(0);
    assert_eq!(instance.name, "fdr");
    assert_eq!(instance.buffer_size, Some(64 * 1024));
    assert_eq!(instance.max_file_size, 1024 * 1024);
    assert_eq!(instance.min_free_percent, 10);

    let runtime = Runtime::with_logrotate_dir(
        tracefs.clone(),
        RotationSignal::new().unwrap(),
        out_dir.path(),
    );
    let handle = spawn_context(instance, runtime).unwrap();
    handle.join().unwrap().unwrap();

    // The probe was switched on and the trace stream landed in the
    // configured output file.
    let enable = tracefs.event_enable_path("fdr", "sched", Some("sched_switch"));
    assert_eq!(fs::read_to_string(enable).unwrap(), "1");
    assert_eq!(
        fs::read(&output).unwrap(),
        b"sched_switch: prev=cc1 next=swapper\n"
    );
    // The configured buffer size reached the control file.
    assert_eq!(
        fs::read_to_string(tracefs.buffer_size_path("fdr")).unwrap(),
        (64u64 * 1024).to_string()
    );
}

#[test]
fn test_context_failure_is_isolated() {
    let config_dir = TempDir::new().unwrap();
    let tracing_root = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let healthy_out = out_dir.path().join("healthy.log");

    let tracefs = TraceFs::new(tracing_root.path());
    plant_instance_controls(&tracefs, "healthy", b"data\n");
    // "broken" gets a directory but no trace_pipe; its saveto fails.
    fs::create_dir_all(tracefs.instance_dir("broken")).unwrap();

    write_config(
        config_dir.path(),
        "both.conf",
        &format!(
            "instance broken\n\
             saveto {}/broken.log\n\
             instance healthy\n\
             enable sched/sched_switch\n\
             saveto {}\n",
            out_dir.path().display(),
            healthy_out.display()
        ),
    );

    let files = discover_config_files(config_dir.path()).unwrap();
    let registry = load_config_files(&files).unwrap();
    assert_eq!(registry.len(), 2);

    let mut handles = Vec::new();
    for instance in registry.into_instances() {
        let runtime = Runtime::with_logrotate_dir(
            tracefs.clone(),
            RotationSignal::new().unwrap(),
            out_dir.path(),
        );
        handles.push((instance.name.clone(), spawn_context(instance, runtime).unwrap()));
    }

    let mut outcomes = Vec::new();
    for (name, handle) in handles {
        outcomes.push((name, handle.join().unwrap()));
    }

    let broken = outcomes.iter().find(|(n, _)| n == "broken").unwrap();
    assert!(broken.1.is_err());
    let healthy = outcomes.iter().find(|(n, _)| n == "healthy").unwrap();
    assert!(healthy.1.is_ok());
    assert_eq!(fs::read(&healthy_out).unwrap(), b"data\n");
}
