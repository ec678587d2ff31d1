use std::cell;
use std::fs;
use std::path;
use std::rc;

use tracepoint_frozen::*;

const PAGE_SIZE: usize = 4096;

fn header_page(page_size: usize) -> String {
    return format!(
        "\tfield: u64 timestamp;\toffset:0;\tsize:8;\tsigned:0;
\tfield: local_t commit;\toffset:8;\tsize:8;\tsigned:1;
\tfield: int overwrite;\toffset:8;\tsize:1;\tsigned:1;
\tfield: char data;\toffset:16;\tsize:{};\tsigned:1;
",
        page_size - 16
    );
}

const SCHED_WAKEUP_ID: u16 = 318;

const SCHED_WAKEUP_FORMAT: &str = "name: sched_wakeup
ID: 318
format:
\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;
\tfield:unsigned char common_flags;\toffset:2;\tsize:1;\tsigned:0;
\tfield:unsigned char common_preempt_count;\toffset:3;\tsize:1;\tsigned:0;
\tfield:int common_pid;\toffset:4;\tsize:4;\tsigned:1;

\tfield:char comm[16];\toffset:8;\tsize:16;\tsigned:0;
\tfield:pid_t pid;\toffset:24;\tsize:4;\tsigned:1;
\tfield:int prio;\toffset:28;\tsize:4;\tsigned:1;
\tfield:int target_cpu;\toffset:32;\tsize:4;\tsigned:1;

print fmt: \"comm=%s pid=%d prio=%d target_cpu=%03d\", REC->comm, REC->pid, REC->prio, REC->target_cpu
";

const IRQ_FORMAT: &str = "name: irq_handler_entry
ID: 50
format:
\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;
\tfield:unsigned char common_flags;\toffset:2;\tsize:1;\tsigned:0;
\tfield:unsigned char common_preempt_count;\toffset:3;\tsize:1;\tsigned:0;
\tfield:int common_pid;\toffset:4;\tsize:4;\tsigned:1;

\tfield:int irq;\toffset:8;\tsize:4;\tsigned:1;
\tfield:__data_loc char[] name;\toffset:12;\tsize:4;\tsigned:0;

print fmt: \"irq=%d name=%s\", REC->irq, __get_str(name)
";

fn write(root: &path::Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// One page holding a single sched_wakeup record for `pid` at `timestamp + 1`.
fn wakeup_page(page_size: usize, timestamp: u64, pid: i32) -> Vec<u8> {
    let mut record = Vec::new();
    record.extend_from_slice(&(9u32 | 1 << 5).to_ne_bytes());
    record.extend_from_slice(&SCHED_WAKEUP_ID.to_ne_bytes());
    record.extend_from_slice(&[0, 0]);
    record.extend_from_slice(&pid.to_ne_bytes());
    let mut comm = [0u8; 16];
    comm[..4].copy_from_slice(b"task");
    record.extend_from_slice(&comm);
    record.extend_from_slice(&pid.to_ne_bytes());
    record.extend_from_slice(&120i32.to_ne_bytes());
    record.extend_from_slice(&0i32.to_ne_bytes());

    let mut page = vec![0u8; page_size];
    page[..8].copy_from_slice(&timestamp.to_ne_bytes());
    page[8..16].copy_from_slice(&(record.len() as u64).to_ne_bytes());
    page[16..16 + record.len()].copy_from_slice(&record);
    return page;
}

/// A tracefs tree under `root` with `pages[cpu]` wakeup pages per CPU.
fn fake_tracefs(root: &path::Path, pages: &[usize]) {
    fake_tracefs_with_page_size(root, pages, PAGE_SIZE);
}

fn fake_tracefs_with_page_size(root: &path::Path, pages: &[usize], page_size: usize) {
    write(root, "events/header_page", header_page(page_size).as_bytes());
    write(root, "events/sched/sched_wakeup/format", SCHED_WAKEUP_FORMAT.as_bytes());
    write(root, "events/irq/irq_handler_entry/format", IRQ_FORMAT.as_bytes());
    for (cpu, &count) in pages.iter().enumerate() {
        let mut contents = Vec::new();
        for i in 0..count {
            contents.extend_from_slice(&wakeup_page(
                page_size,
                1000 * i as u64,
                (cpu * 100 + i) as i32,
            ));
        }
        write(root, &format!("per_cpu/cpu{}/trace_pipe_raw", cpu), &contents);
    }
}

fn data_source(
    root: &path::Path,
    config_json: &str,
    writer: Box<dyn TraceWriter>,
) -> (rc::Rc<LocalTaskRunner>, FrozenFtraceDataSource) {
    let runner = rc::Rc::new(LocalTaskRunner::new());
    let config = DataSourceConfig::new("linux.frozen_ftrace", config_json.as_bytes());
    let source = FrozenFtraceDataSource::new(runner.clone(), &config, 7, writer).with_tracefs_root(root);
    return (runner, source);
}

#[test]
fn drains_every_cpu_of_a_tree() {
    let dir = tempfile::tempdir().unwrap();
    fake_tracefs(dir.path(), &[10, 10, 10, 10]);

    let writer = MemoryTraceWriter::new();
    let committed = writer.committed();
    let (runner, mut source) = data_source(
        dir.path(),
        r#"{"ftrace_events": ["sched/sched_wakeup"]}"#,
        Box::new(writer),
    );

    source.start();
    assert!(source.is_active());
    assert_eq!(runner.pending_tasks(), 1);
    assert_eq!(runner.run_until_idle(), 1);

    let calls = rc::Rc::new(cell::Cell::new(0));
    let counter = calls.clone();
    source.flush(0, move || counter.set(counter.get() + 1));
    assert_eq!(calls.get(), 1);

    let bundles = committed.bundles();
    assert_eq!(bundles.len(), 40);
    assert_eq!(committed.event_count(), 40);

    let first = &bundles[0];
    assert_eq!(first.cpu, 0);
    assert_eq!(first.ftrace_clock, FtraceClock::Unspecified);
    assert!(first.parse_errors.is_empty());

    let event = &first.events[0];
    assert_eq!(event.system, "sched");
    assert_eq!(event.name, "sched_wakeup");
    assert_eq!(event.timestamp, 1);
    assert_eq!(event.pid, 0);
    assert_eq!(event.field("comm"), Some(&FieldValue::Str("task".into())));
    assert_eq!(event.field("prio"), Some(&FieldValue::Signed(120)));

    let last = &bundles[39];
    assert_eq!(last.cpu, 3);
    assert_eq!(last.page_timestamp, 9000);
    assert_eq!(last.events[0].pid, 309);
}

#[test]
fn reads_sub_buffers_larger_than_a_page() {
    let dir = tempfile::tempdir().unwrap();
    fake_tracefs_with_page_size(dir.path(), &[3], 64 * 1024);

    let writer = MemoryTraceWriter::new();
    let committed = writer.committed();
    let (runner, mut source) = data_source(
        dir.path(),
        r#"{"ftrace_events": ["sched/sched_wakeup"]}"#,
        Box::new(writer),
    );

    source.start();
    runner.run_until_idle();
    source.flush(0, || {});

    assert_eq!(source.stats().pages, 3);
    assert_eq!(source.stats().parse_errors, 0);
    assert_eq!(committed.event_count(), 3);
    assert_eq!(committed.bundles()[2].events[0].pid, 2);
}

#[test]
fn default_filter_decodes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    fake_tracefs(dir.path(), &[2]);

    let writer = MemoryTraceWriter::new();
    let committed = writer.committed();
    let (runner, mut source) = data_source(dir.path(), "", Box::new(writer));

    source.start();
    runner.run_until_idle();
    source.flush(0, || {});

    assert_eq!(committed.len(), 2);
    assert_eq!(committed.event_count(), 0);
}

#[test]
fn json_output() {
    let dir = tempfile::tempdir().unwrap();
    fake_tracefs(dir.path(), &[1]);

    let out = tempfile::NamedTempFile::new().unwrap();
    let writer = JsonTraceWriter::new(out.reopen().unwrap());
    let (runner, mut source) = data_source(
        dir.path(),
        r#"{"ftrace_events": ["sched_wakeup"]}"#,
        Box::new(writer),
    );

    source.start();
    runner.run_until_idle();
    assert_eq!(fs::read_to_string(out.path()).unwrap(), "");
    source.flush(0, || {});

    let text = fs::read_to_string(out.path()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1);

    let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(value["cpu"], 0);
    assert_eq!(value["events"][0]["name"], "sched_wakeup");
    assert_eq!(value["events"][0]["fields"][0]["name"], "comm");
    assert_eq!(value["events"][0]["fields"][0]["value"], "task");
}

#[test]
fn reads_named_instance() {
    let dir = tempfile::tempdir().unwrap();
    fake_tracefs(dir.path(), &[1]);
    fake_tracefs(&dir.path().join("instances/boot"), &[3, 3]);

    let writer = MemoryTraceWriter::new();
    let committed = writer.committed();
    let (runner, mut source) = data_source(dir.path(), r#"{"instance_name": "boot"}"#, Box::new(writer));

    source.start();
    runner.run_until_idle();
    source.flush(0, || {});
    assert_eq!(committed.len(), 6);
}

#[test]
fn bad_instance_name_is_inert() {
    let dir = tempfile::tempdir().unwrap();
    fake_tracefs(dir.path(), &[1]);

    for name in ["../boot", "missing"] {
        let writer = MemoryTraceWriter::new();
        let committed = writer.committed();
        let config = format!(r#"{{"instance_name": "{}"}}"#, name);
        let (runner, mut source) = data_source(dir.path(), &config, Box::new(writer));

        source.start();
        assert!(!source.is_active());
        assert_eq!(runner.pending_tasks(), 0);
        source.flush(0, || {});
        assert!(committed.is_empty());
    }
}

#[test]
fn missing_tracefs_is_inert() {
    let dir = tempfile::tempdir().unwrap();

    let writer = MemoryTraceWriter::new();
    let committed = writer.committed();
    let (runner, mut source) = data_source(&dir.path().join("nope"), "", Box::new(writer));

    source.start();
    assert!(!source.is_active());
    assert_eq!(runner.pending_tasks(), 0);

    let calls = rc::Rc::new(cell::Cell::new(0));
    let counter = calls.clone();
    source.flush(0, move || counter.set(counter.get() + 1));
    assert_eq!(calls.get(), 1);
    assert!(committed.is_empty());
}

#[test]
fn tree_without_cpus_is_inert() {
    let dir = tempfile::tempdir().unwrap();
    fake_tracefs(dir.path(), &[]);
    fs::create_dir_all(dir.path().join("per_cpu")).unwrap();

    let (runner, mut source) = data_source(dir.path(), "", Box::new(MemoryTraceWriter::new()));
    source.start();
    assert!(!source.is_active());
    assert_eq!(runner.pending_tasks(), 0);
}

#[test]
fn start_does_not_modify_tracefs() {
    let dir = tempfile::tempdir().unwrap();
    fake_tracefs(dir.path(), &[2]);
    let pipe = dir.path().join("per_cpu/cpu0/trace_pipe_raw");
    let before = fs::read(&pipe).unwrap();

    let (runner, mut source) = data_source(dir.path(), "", Box::new(MemoryTraceWriter::new()));
    source.start();
    runner.run_until_idle();

    assert_eq!(fs::read(&pipe).unwrap(), before);
    assert!(!dir.path().join("tracing_on").exists());
}
