//! Shared fixtures for integration tests.
#![allow(dead_code)]

use nodeprep::error::Result;
use nodeprep::host::{HostState, ToolOutput, ToolRunner};
use std::path::Path;
use std::sync::Mutex;

/// ToolRunner fake that records invocations and serves scripted responses.
pub struct FakeRunner {
    calls: Mutex<Vec<String>>,
    failures: Vec<String>,
    stdout_overrides: Vec<(String, String)>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Vec::new(),
            stdout_overrides: Vec::new(),
        }
    }

    /// Fail every invocation whose command line starts with `prefix`.
    pub fn failing_on(prefix: &str) -> Self {
        let mut runner = Self::new();
        runner.failures.push(prefix.to_string());
        runner
    }

    /// Serve `stdout` for invocations whose command line starts with `prefix`.
    pub fn with_stdout(mut self, prefix: &str, stdout: &str) -> Self {
        self.stdout_overrides
            .push((prefix.to_string(), stdout.to_string()));
        self
    }

    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn default_stdout(line: &str) -> String {
        if line.starts_with("uname -m") {
            "x86_64\n".to_string()
        } else if line.starts_with("kubeadm token create") {
            "kubeadm join 10.0.0.10:6443 --token abcdef.0123456789abcdef \
             --discovery-token-ca-cert-hash sha256:1234\n"
                .to_string()
        } else if line.starts_with("containerd config default") {
            SAMPLE_RUNTIME_CONFIG.to_string()
        } else {
            String::new()
        }
    }
}

impl ToolRunner for FakeRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<ToolOutput> {
        let line = format!("{} {}", program, args.join(" "));
        self.calls.lock().unwrap().push(line.clone());

        let failed = self.failures.iter().any(|f| line.starts_with(f.as_str()));
        let stdout = self
            .stdout_overrides
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_else(|| Self::default_stdout(&line));

        Ok(ToolOutput {
            exit_code: if failed { 1 } else { 0 },
            stdout,
            stderr: if failed {
                "scripted failure".to_string()
            } else {
                String::new()
            },
        })
    }
}

/// A trimmed default runtime configuration as the runtime binary emits it.
pub const SAMPLE_RUNTIME_CONFIG: &str = r#"version = 2
disabled_plugins = ["cri"]

[plugins]
  [plugins."io.containerd.grpc.v1.cri"]
    sandbox_image = "registry.k8s.io/pause:3.8"
    [plugins."io.containerd.grpc.v1.cri".containerd]
      [plugins."io.containerd.grpc.v1.cri".containerd.runtimes]
        [plugins."io.containerd.grpc.v1.cri".containerd.runtimes.runc]
          [plugins."io.containerd.grpc.v1.cri".containerd.runtimes.runc.options]
            SystemdCgroup = false
"#;

/// Populate a fake /proc root.
pub fn write_proc_fixture(root: &Path, cpus: usize, mem_kib: u64, swap_active: bool, ip_forward: bool) {
    let mut cpuinfo = String::new();
    for i in 0..cpus {
        cpuinfo.push_str(&format!("processor\t: {}\nmodel name\t: test cpu\n\n", i));
    }
    std::fs::write(root.join("cpuinfo"), cpuinfo).unwrap();

    std::fs::write(
        root.join("meminfo"),
        format!("MemTotal:       {} kB\nMemFree:        123456 kB\n", mem_kib),
    )
    .unwrap();

    let mut swaps = String::from("Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority\n");
    if swap_active {
        swaps.push_str("/dev/sda2                               partition\t2097148\t\t0\t\t-2\n");
    }
    std::fs::write(root.join("swaps"), swaps).unwrap();

    let sys_dir = root.join("sys/net/ipv4");
    std::fs::create_dir_all(&sys_dir).unwrap();
    std::fs::write(
        sys_dir.join("ip_forward"),
        if ip_forward { "1\n" } else { "0\n" },
    )
    .unwrap();
}

/// A HostState over two tempdir roots.
pub fn host_with_fixture(
    proc_dir: &tempfile::TempDir,
    etc_dir: &tempfile::TempDir,
) -> HostState {
    HostState::with_roots(proc_dir.path(), etc_dir.path())
}
