// tests/run_scenarios.rs
//
// End-to-end runs: the built binary is launched in child mode and streams
// into a recording transport.

mod common;
use crate::common::builders::quick_settings;
use crate::common::{
    FINISHED, OUTPUT, Record, RecordingTransport, STARTED, TestResult, abort_after, child,
    init_tracing, never_abort, sh, with_timeout, BIN,
};

use std::fs::File;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde_json::json;
use streamtask::channel::{ChannelPairs, RESULT_TERMINATOR, set_cloexec};
use streamtask::exec::CommandJob;
use streamtask::{ChildCommand, Run, RunSettings, RunStatus};

async fn execute(
    transport: &RecordingTransport,
    settings: RunSettings,
    command: ChildCommand,
    probe: impl FnMut() -> bool + Send + 'static,
) -> RunStatus {
    let run = Run::new(json!(["run", 7]), transport.clone(), settings, probe);
    with_timeout(run.execute(command)).await
}

/// State letter from `/proc/<pid>/stat`, or `None` once the pid is gone.
fn process_state(pid: u32) -> Option<char> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let after_name = stat.rsplit_once(')')?.1;
    after_name.trim_start().chars().next()
}

fn is_gone(pid: u32) -> bool {
    matches!(process_state(pid), None | Some('Z') | Some('X'))
}

/// Give the kernel up to two seconds to retire `pid`.
async fn wait_until_gone(pid: u32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !is_gone(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    is_gone(pid)
}

#[tokio::test]
async fn streams_output_in_order_then_reports_result() -> TestResult {
    init_tracing();
    let transport = RecordingTransport::new();

    let job = sh("printf a; sleep 0.2; printf b; sleep 0.2; printf c; exit 42");
    let status = execute(&transport, quick_settings(), child(&job), never_abort()).await;

    assert_eq!(status, RunStatus::Done("42".to_string()));
    assert_eq!(transport.actions(), vec![STARTED, OUTPUT, OUTPUT, OUTPUT, FINISHED]);
    assert_eq!(transport.outputs(), vec!["a", "b", "c"]);

    let payloads = transport.payloads();
    assert!(payloads.iter().all(|p| p["identity"] == json!(["run", 7])));
    assert!(payloads[0].get("output").is_none());

    let records = transport.records();
    assert!(matches!(records.first(), Some(Record::Connect { .. })));
    assert_eq!(records.last(), Some(&Record::Disconnect));
    assert_eq!(transport.acked(), 1, "finished message carries a delivery callback");
    Ok(())
}

#[tokio::test]
async fn abort_kills_the_child_and_its_descendants() -> TestResult {
    init_tracing();
    let transport = RecordingTransport::new();

    // `$$` is the shell; `sleep` runs as its child.
    let job = sh("echo $$; sleep 10");
    let started = Instant::now();
    let status = execute(
        &transport,
        quick_settings(),
        child(&job),
        abort_after(Duration::from_millis(250)),
    )
    .await;

    assert_eq!(status, RunStatus::Aborted);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(transport.actions().first().map(String::as_str), Some(STARTED));
    assert_eq!(transport.actions().last().map(String::as_str), Some(FINISHED));

    let shell_pid: u32 = transport.output_text().trim().parse()?;
    assert!(wait_until_gone(shell_pid).await, "job shell {shell_pid} survived the run");
    Ok(())
}

#[tokio::test]
async fn finished_run_leaves_no_child_behind() -> TestResult {
    init_tracing();
    let transport = RecordingTransport::new();

    // The shell's parent is the isolated child, which never exits by itself.
    let job = sh("echo $PPID; exit 0");
    let status = execute(&transport, quick_settings(), child(&job), never_abort()).await;

    assert_eq!(status, RunStatus::Done("0".to_string()));
    let child_pid: u32 = transport.output_text().trim().parse()?;
    assert!(wait_until_gone(child_pid).await, "child {child_pid} survived a finished run");
    Ok(())
}

#[tokio::test]
async fn failed_run_leaves_no_child_behind() -> TestResult {
    init_tracing();
    let transport = RecordingTransport::new();

    let job = sh("echo $PPID; kill -9 $$");
    let status = execute(&transport, quick_settings(), child(&job), never_abort()).await;

    assert_eq!(status, RunStatus::Failed);
    let child_pid: u32 = transport.output_text().trim().parse()?;
    assert!(wait_until_gone(child_pid).await, "child {child_pid} survived a failed run");
    Ok(())
}

#[test]
fn failing_job_reports_exactly_one_result() -> TestResult {
    let (read, write) = ChannelPairs::open()?.split();
    let (output_fd, control_fd) = write.raw_fds();
    let job = serde_json::to_string(&CommandJob::new("/definitely/not/a/program"))?;

    let mut command = std::process::Command::new(BIN);
    command
        .args(["__exec-job", "--job", &job])
        .envs(write.env())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    // SAFETY: only fcntl runs between fork and exec.
    unsafe {
        command.pre_exec(move || {
            set_cloexec(output_fd, false)?;
            set_cloexec(control_fd, false)
        });
    }
    let mut proc = command.spawn()?;
    drop(write);

    // The child closes its control end right after reporting, while it keeps
    // running, so end-of-file here means every byte it will ever send is in.
    let mut report = Vec::new();
    File::from(read.control).read_to_end(&mut report)?;
    let _output = read.output;

    proc.kill()?;
    proc.wait()?;

    let mut expected = b"FAILED".to_vec();
    expected.push(RESULT_TERMINATOR);
    assert_eq!(report, expected);
    Ok(())
}

#[tokio::test]
async fn job_that_cannot_start_is_failed() -> TestResult {
    init_tracing();
    let transport = RecordingTransport::new();

    let job = CommandJob::new("/definitely/not/a/program");
    let status = execute(&transport, quick_settings(), child(&job), never_abort()).await;

    assert_eq!(status, RunStatus::Failed);
    assert_eq!(transport.actions(), vec![STARTED, FINISHED]);
    Ok(())
}

#[tokio::test]
async fn launch_failure_still_brackets_the_run() -> TestResult {
    init_tracing();
    let transport = RecordingTransport::new();

    let command = ChildCommand::new("/definitely/not/streamtask");
    let status = execute(&transport, quick_settings(), command, never_abort()).await;

    assert_eq!(status, RunStatus::Failed);
    assert_eq!(transport.actions(), vec![STARTED, FINISHED]);
    assert!(matches!(transport.records().first(), Some(Record::Connect { .. })));
    assert_eq!(transport.records().last(), Some(&Record::Disconnect));
    Ok(())
}

#[tokio::test]
async fn undecodable_job_is_failed() -> TestResult {
    init_tracing();
    let transport = RecordingTransport::new();

    let command = ChildCommand::new(BIN)
        .arg("__exec-job")
        .arg("--job")
        .arg("not json");
    let status = execute(&transport, quick_settings(), command, never_abort()).await;

    assert_eq!(status, RunStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn stderr_is_streamed_with_stdout() -> TestResult {
    init_tracing();
    let transport = RecordingTransport::new();

    let job = sh("echo out; echo oops >&2; exit 1");
    let status = execute(&transport, quick_settings(), child(&job), never_abort()).await;

    assert_eq!(status, RunStatus::Done("1".to_string()));
    let text = transport.output_text();
    assert!(text.contains("out\n"), "{text:?}");
    assert!(text.contains("oops\n"), "{text:?}");
    Ok(())
}

#[tokio::test]
async fn bulk_output_is_delivered_exactly() -> TestResult {
    init_tracing();
    let transport = RecordingTransport::new();
    let settings = RunSettings {
        max_read_bytes: 8192,
        ..quick_settings()
    };

    let job = sh("head -c 100000 /dev/zero | tr '\\0' x");
    let status = execute(&transport, settings, child(&job), never_abort()).await;

    assert_eq!(status, RunStatus::Done("0".to_string()));
    assert_eq!(transport.output_text(), "x".repeat(100_000));
    assert!(transport.outputs().iter().all(|c| c.len() <= 8192));
    Ok(())
}

#[tokio::test]
async fn unreachable_transport_does_not_fail_the_run() -> TestResult {
    init_tracing();
    let transport = RecordingTransport::failing();

    let status = execute(&transport, quick_settings(), child(&sh("echo hi")), never_abort()).await;

    assert_eq!(status, RunStatus::Done("0".to_string()));
    assert_eq!(transport.actions(), vec![STARTED, OUTPUT, FINISHED]);
    Ok(())
}

#[test]
fn child_mode_without_channels_exits_with_an_error() -> TestResult {
    let out = std::process::Command::new(BIN)
        .args(["__exec-job", "--job", r#"{"program":"true"}"#])
        .env_remove("STREAMTASK_OUTPUT_FD")
        .env_remove("STREAMTASK_CONTROL_FD")
        .output()?;

    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("STREAMTASK_OUTPUT_FD"));
    Ok(())
}
