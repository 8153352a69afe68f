use anyhow::{Context, Result};
use console::style;
use std::process::Command;
use std::time::Instant;

pub struct TaskRunner {
    num_tasks: u32,
    current_task: u32,
    now: Instant,
    descr: String,
    started: bool,
}

impl TaskRunner {
    pub fn new(num_tasks: u32) -> Self {
        Self {
            num_tasks,
            current_task: 0,
            now: Instant::now(),
            descr: "".into(),
            started: false,
        }
    }

    fn task_id(&self) -> String {
        style(format!("[{}/{}]", self.current_task + 1, self.num_tasks))
            .force_styling(true)
            .to_string()
    }

    pub fn start_task(&mut self, descr: impl Into<String>) {
        if self.started {
            self.finish_task(true);
        }
        self.now = Instant::now();
        self.descr = descr.into();
        self.started = true;
        println!("{} {}", self.task_id(), &self.descr);
    }

    fn finish_task(&mut self, skipped: bool) {
        self.started = false;
        let status = if skipped {
            "[SKIPPED]".to_string()
        } else {
            let time = self.now.elapsed();
            format!("[{}ms]", time.as_millis())
        };
        println!("{} {} {}", self.task_id(), &self.descr, status);
        self.current_task += 1;
    }

    pub fn end_task(&mut self) {
        self.finish_task(false);
    }
}

fn format_error(command: &Command, status: Option<i32>) -> String {
    let status = if let Some(code) = status {
        format!(" exited with {code}")
    } else {
        Default::default()
    };
    format!("{} `{:?}`{}", style("[ERROR]").red(), command, status)
}

/// Runs `command` to completion, echoing the command line and everything it
/// wrote. Returns stdout followed by stderr.
pub fn capture(command: &mut Command) -> Result<String> {
    println!("{} {:?}", style("running").bold(), command);
    let output = command
        .output()
        .with_context(|| format_error(command, None))?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    if !text.is_empty() {
        print!("{}", text);
        if !text.ends_with('\n') {
            println!();
        }
    }
    if !output.status.success() {
        anyhow::bail!("{}", format_error(command, output.status.code()));
    }
    Ok(text)
}
