use common::{CommandSpec, SupervisorConfig};
use std::future::Future;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use crate::channel::ControlChannel;
use crate::error::SupervisorError;
use crate::process::{SupervisedProcess, Termination};

const PROMPT: &str = "\n> Enter \"Q[UIT]\" to quit!\n# ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Initializing,
    Running,
    ShuttingDown,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Operator,
    Interrupt,
    InputClosed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// The producer exited within the grace period.
    pub producer_stopped: bool,
    /// `QUIT` reached the writer's control channel.
    pub writer_notified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Completed(ShutdownReport),
    AlreadyShutDown,
}

/// Lets exactly one caller through.
#[derive(Debug, Default)]
pub struct ShutdownGuard(AtomicBool);

impl ShutdownGuard {
    pub fn try_begin(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Everything the supervisor needs to bring the pipeline up.
#[derive(Debug, Clone)]
pub struct SupervisorPlan {
    pub producer_fifo: PathBuf,
    pub writer_fifo: PathBuf,
    pub producer: CommandSpec,
    pub status_init: CommandSpec,
    pub writer: CommandSpec,
    pub strict_status_init: bool,
    pub producer_grace: Duration,
    pub ready_delay: Duration,
}

impl SupervisorPlan {
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            producer_fifo: config.producer_fifo.clone(),
            writer_fifo: config.writer_fifo.clone(),
            producer: config.producer.command(),
            status_init: config.status_init_command(),
            writer: config.writer_command(),
            strict_status_init: config.strict_status_init,
            producer_grace: Duration::from_millis(config.producer_grace_ms),
            ready_delay: Duration::from_millis(config.ready_delay_ms),
        }
    }
}

pub fn is_quit(line: &str) -> bool {
    let line = line.trim();
    line.eq_ignore_ascii_case("q") || line.eq_ignore_ascii_case("quit")
}

/// Forwards lines from `input` read on a plain thread.
///
/// A read blocked on the terminal cannot hold up runtime shutdown; the thread
/// dies with the process.
pub fn spawn_line_reader<R>(input: R) -> mpsc::Receiver<std::io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in input.lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

pub struct Supervisor {
    plan: SupervisorPlan,
    state: SupervisorState,
    producer_channel: ControlChannel,
    writer_channel: ControlChannel,
    producer: Option<SupervisedProcess>,
    writer: Option<SupervisedProcess>,
    guard: ShutdownGuard,
}

impl Supervisor {
    pub fn new(plan: SupervisorPlan) -> Self {
        Self {
            producer_channel: ControlChannel::new(&plan.producer_fifo),
            writer_channel: ControlChannel::new(&plan.writer_fifo),
            plan,
            state: SupervisorState::Initializing,
            producer: None,
            writer: None,
            guard: ShutdownGuard::default(),
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn producer_pid(&self) -> Option<u32> {
        self.producer.as_ref().and_then(|p| p.id())
    }

    pub fn writer_pid(&self) -> Option<u32> {
        self.writer.as_ref().and_then(|p| p.id())
    }

    /// Clears both control FIFOs. Nothing may be launched if this fails.
    pub fn initialize(&mut self) -> Result<(), SupervisorError> {
        println!("Clearing control FIFOs");
        for channel in [&self.producer_channel, &self.writer_channel] {
            channel.reset()?;
            log::debug!("Reset control channel {:?}", channel.path());
        }
        Ok(())
    }

    /// Starts the producer, runs status init, starts the writer.
    ///
    /// On failure anything already started is shut down before returning.
    pub async fn launch(&mut self) -> Result<(), SupervisorError> {
        println!("> Starting the fake_gpu hashpipe plugin");
        self.producer = Some(SupervisedProcess::spawn(
            "producer",
            &self.plan.producer,
            Termination::Signal,
        )?);

        println!("> Setting necessary status memory key values");
        let status_init = self.plan.status_init.run().await;
        match status_init {
            Ok(outcome) => {
                log::info!("{} finished: {}", self.plan.status_init, outcome.status);
            }
            Err(e) if self.plan.strict_status_init => {
                log::error!("Status initialization failed: {}", e);
                self.shutdown().await;
                return Err(SupervisorError::StatusInit(e));
            }
            Err(e) => log::warn!("Status initialization failed, continuing: {}", e),
        }

        println!("> Starting vegasFitsWriter");
        let writer = SupervisedProcess::spawn(
            "writer",
            &self.plan.writer,
            Termination::Channel(self.writer_channel.clone()),
        );
        match writer {
            Ok(writer) => self.writer = Some(writer),
            Err(e) => {
                log::error!("Failed to start writer: {}", e);
                self.shutdown().await;
                return Err(e.into());
            }
        }

        self.state = SupervisorState::Running;
        log::info!(
            "Pipeline up: producer pid {:?}, writer pid {:?}",
            self.producer_pid(),
            self.writer_pid()
        );
        println!("> READY TO START SCANNING!");
        println!("> Use the \"run_scan\" command to run a scan\n");
        // Let the children's startup output land before the prompt
        tokio::time::sleep(self.plan.ready_delay).await;
        Ok(())
    }

    /// Prompts on `prompt` and takes operator `lines` until one is a quit,
    /// the input closes, or `interrupt` resolves.
    pub async fn wait_for_stop<W, F>(
        &self,
        mut lines: mpsc::Receiver<std::io::Result<String>>,
        prompt: &mut W,
        interrupt: F,
    ) -> StopReason
    where
        W: Write,
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        loop {
            if let Err(e) = prompt.write_all(PROMPT.as_bytes()).and_then(|_| prompt.flush()) {
                log::warn!("Failed to write prompt: {}", e);
            }

            tokio::select! {
                _ = &mut interrupt => {
                    log::info!("Interrupt received");
                    return StopReason::Interrupt;
                }
                line = lines.recv() => match line {
                    Some(Ok(line)) if is_quit(&line) => return StopReason::Operator,
                    Some(Ok(line)) => log::debug!("Ignoring input {:?}", line),
                    None => {
                        log::info!("Operator input closed");
                        return StopReason::InputClosed;
                    }
                    Some(Err(e)) => {
                        log::error!("Failed to read operator input: {}", e);
                        return StopReason::InputClosed;
                    }
                },
            }
        }
    }

    /// Stops the producer with SIGTERM and tells the writer to quit.
    ///
    /// Runs its teardown once; later calls return `AlreadyShutDown`.
    pub async fn shutdown(&mut self) -> ShutdownOutcome {
        if !self.guard.try_begin() {
            log::warn!("Shutdown already ran, ignoring");
            return ShutdownOutcome::AlreadyShutDown;
        }
        self.state = SupervisorState::ShuttingDown;
        println!("> Killing fake_gpu and vegasFitsWriter...");

        let mut report = ShutdownReport::default();

        if let Some(producer) = self.producer.as_mut() {
            match producer.request_stop() {
                Ok(()) => match producer.wait_exit(self.plan.producer_grace).await {
                    Some(status) => {
                        log::info!("{} exited: {}", producer.name(), status);
                        report.producer_stopped = true;
                    }
                    None => log::warn!(
                        "{} still running {:?} after SIGTERM",
                        producer.name(),
                        self.plan.producer_grace
                    ),
                },
                Err(e) => log::error!("{}", e),
            }
        }

        if let Some(writer) = self.writer.as_ref() {
            match writer.request_stop() {
                Ok(()) => report.writer_notified = true,
                Err(e) => log::error!("Failed to notify {}: {}", writer.name(), e),
            }
        }

        self.state = SupervisorState::Terminated;
        ShutdownOutcome::Completed(report)
    }

    /// Full lifecycle against the controlling terminal and process signals.
    pub async fn run(&mut self) -> Result<StopReason, SupervisorError> {
        // Registered before launch so an early Ctrl-C is not lost
        let mut sigint = signal(SignalKind::interrupt()).map_err(SupervisorError::SignalHandler)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(SupervisorError::SignalHandler)?;

        self.initialize()?;
        self.launch().await?;

        let interrupt = async {
            tokio::select! {
                _ = sigint.recv() => log::debug!("SIGINT"),
                _ = sigterm.recv() => log::debug!("SIGTERM"),
            }
        };
        let lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
        let reason = self
            .wait_for_stop(lines, &mut std::io::stdout(), interrupt)
            .await;

        if let ShutdownOutcome::Completed(report) = self.shutdown().await {
            log::info!(
                "Shutdown complete (producer stopped: {}, writer notified: {})",
                report.producer_stopped,
                report.writer_notified
            );
        }
        Ok(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    use std::fs::{self, OpenOptions};
    use std::path::Path;
    use std::time::Instant;

    fn test_plan(dir: &Path) -> SupervisorPlan {
        SupervisorPlan {
            producer_fifo: dir.join("fake_gpu_control"),
            writer_fifo: dir.join("vegas_fits_control"),
            producer: CommandSpec::new("sleep").arg("30"),
            status_init: CommandSpec::new("true"),
            writer: CommandSpec::new("sleep").arg("2"),
            strict_status_init: true,
            producer_grace: Duration::from_secs(2),
            ready_delay: Duration::ZERO,
        }
    }

    fn alive(pid: u32) -> bool {
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    fn writable(path: &Path) -> bool {
        OpenOptions::new().append(true).open(path).is_ok()
    }

    #[test]
    fn test_is_quit_ignores_case_and_trims_whitespace() {
        assert!(is_quit("q"));
        assert!(is_quit("Q"));
        assert!(is_quit("quit\n"));
        assert!(is_quit("  QuIt "));
        assert!(is_quit(" q "));
        assert!(!is_quit(""));
        assert!(!is_quit("qu"));
        assert!(!is_quit("exit"));
    }

    #[test]
    fn test_guard_fires_once() {
        let guard = ShutdownGuard::default();
        assert!(guard.try_begin());
        assert!(!guard.try_begin());
        assert!(!guard.try_begin());
    }

    #[test]
    fn test_plan_from_config() {
        let config = SupervisorConfig::default();
        let plan = SupervisorPlan::from_config(&config);
        assert_eq!(plan.producer.program, PathBuf::from("taskset"));
        assert_eq!(plan.writer.program, PathBuf::from("vegasFitsWriter"));
        assert_eq!(plan.writer_fifo, PathBuf::from("/tmp/vegas_fits_control"));
        assert_eq!(plan.producer_grace, Duration::from_secs(2));
    }

    #[test]
    fn test_initialize_fails_without_launching() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = test_plan(dir.path());
        plan.writer_fifo = dir.path().join("missing").join("vegas_fits_control");

        let mut supervisor = Supervisor::new(plan);
        let err = supervisor.initialize().unwrap_err();
        assert!(matches!(err, SupervisorError::Channel(_)));
        assert_eq!(supervisor.state(), SupervisorState::Initializing);
        assert!(supervisor.producer_pid().is_none());
    }

    #[tokio::test]
    async fn test_interrupt_stops_producer_and_quits_writer() {
        let dir = tempfile::tempdir().unwrap();
        let mut supervisor = Supervisor::new(test_plan(dir.path()));
        supervisor.initialize().unwrap();
        supervisor.launch().await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Running);
        let producer_pid = supervisor.producer_pid().unwrap();

        // Input that never arrives: the interrupt must preempt the read
        let (_operator, lines) = mpsc::channel(1);
        let mut prompt = Vec::<u8>::new();
        let started = Instant::now();
        let reason = supervisor
            .wait_for_stop(lines, &mut prompt, async {})
            .await;
        assert_eq!(reason, StopReason::Interrupt);

        let outcome = supervisor.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(
            outcome,
            ShutdownOutcome::Completed(ShutdownReport {
                producer_stopped: true,
                writer_notified: true,
            })
        );
        assert!(!alive(producer_pid));
        assert_eq!(
            fs::read_to_string(dir.path().join("vegas_fits_control")).unwrap(),
            "QUIT"
        );
        assert_eq!(supervisor.state(), SupervisorState::Terminated);
    }

    #[tokio::test]
    async fn test_operator_quit_after_ignored_input() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(test_plan(dir.path()));

        let mut prompt = Vec::<u8>::new();
        let reason = supervisor
            .wait_for_stop(
                spawn_line_reader(&b"hello\nstart\nQuit\nnever read\n"[..]),
                &mut prompt,
                std::future::pending(),
            )
            .await;
        assert_eq!(reason, StopReason::Operator);
        let prompt = String::from_utf8(prompt).unwrap();
        assert_eq!(prompt.matches("Enter \"Q[UIT]\" to quit!").count(), 3);
    }

    #[tokio::test]
    async fn test_closed_input_stops() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(test_plan(dir.path()));
        let reason = supervisor
            .wait_for_stop(
                spawn_line_reader(&b""[..]),
                &mut Vec::<u8>::new(),
                std::future::pending(),
            )
            .await;
        assert_eq!(reason, StopReason::InputClosed);
    }

    #[tokio::test]
    async fn test_double_shutdown_is_safe() {
        let dir = tempfile::tempdir().unwrap();
        let mut supervisor = Supervisor::new(test_plan(dir.path()));
        supervisor.initialize().unwrap();
        supervisor.launch().await.unwrap();

        assert!(matches!(
            supervisor.shutdown().await,
            ShutdownOutcome::Completed(_)
        ));
        assert_eq!(supervisor.shutdown().await, ShutdownOutcome::AlreadyShutDown);

        let writer_fifo = dir.path().join("vegas_fits_control");
        assert_eq!(fs::read_to_string(&writer_fifo).unwrap(), "QUIT");
        assert!(writable(&writer_fifo));
        assert!(writable(&dir.path().join("fake_gpu_control")));
        assert_eq!(supervisor.state(), SupervisorState::Terminated);
    }

    #[tokio::test]
    async fn test_strict_status_init_failure_tears_down_producer() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = test_plan(dir.path());
        plan.status_init = CommandSpec::new("false");

        let mut supervisor = Supervisor::new(plan);
        supervisor.initialize().unwrap();
        let err = supervisor.launch().await.unwrap_err();
        assert!(matches!(err, SupervisorError::StatusInit(_)));

        assert!(supervisor.producer_pid().is_none());
        assert!(supervisor.writer_pid().is_none());
        assert_eq!(
            fs::read_to_string(dir.path().join("vegas_fits_control")).unwrap(),
            ""
        );
    }

    #[tokio::test]
    async fn test_lenient_status_init_failure_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = test_plan(dir.path());
        plan.status_init = CommandSpec::new("false");
        plan.strict_status_init = false;

        let mut supervisor = Supervisor::new(plan);
        supervisor.initialize().unwrap();
        supervisor.launch().await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Running);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_writer_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = test_plan(dir.path());
        plan.writer = CommandSpec::new("/nonexistent/vegasFitsWriter");

        let mut supervisor = Supervisor::new(plan);
        supervisor.initialize().unwrap();
        let err = supervisor.launch().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Launch(_)));
        assert!(supervisor.producer_pid().is_none());
    }
}
