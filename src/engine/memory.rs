// src/engine/memory.rs
//
// Memory-aware bound on the number of execution contexts.
//
// Every context holds a decoded RGBA surface plus codec scratch space, so
// on a memory-limited container the CPU count alone would overcommit.
// Limits come from cgroup v2, then cgroup v1, then /proc/meminfo.

use std::fs;

/// Conservative working set of one conversion (decode + resample + encode)
pub const ESTIMATED_MEMORY_PER_JOB: u64 = 128 * 1024 * 1024;

/// Memory left to the OS and the embedding process: 5% clamped to these
const MIN_RESERVED_MEMORY: u64 = 64 * 1024 * 1024;
const MAX_RESERVED_MEMORY: u64 = 512 * 1024 * 1024;

/// Upper bound no matter how much memory is available
pub const MAX_MEMORY_BASED_WORKERS: usize = 16;

/// cgroup v1 reports "unlimited" as a huge number near i64::MAX
const CGROUP_V1_UNLIMITED_THRESHOLD: u64 = 1 << 60;

/// Memory available to this process, or `None` when nothing is detectable.
pub fn detect_available_memory() -> Option<u64> {
    let mountinfo = fs::read_to_string("/proc/self/mountinfo").unwrap_or_default();
    let cgroup = fs::read_to_string("/proc/self/cgroup").unwrap_or_default();

    detect_cgroup_v2_limit(&mountinfo, &cgroup)
        .or_else(|| detect_cgroup_v1_limit(&mountinfo, &cgroup))
        .or_else(detect_system_memory)
}

fn detect_cgroup_v2_limit(mountinfo: &str, cgroup: &str) -> Option<u64> {
    let mount = CgroupMount::find(mountinfo, |fstype, _| fstype == "cgroup2")
        .unwrap_or_else(|| CgroupMount::fallback("/sys/fs/cgroup"));
    let rel = cgroup_v2_path(cgroup).unwrap_or_default();
    let raw = fs::read_to_string(mount.file_for(&rel, "memory.max")).ok()?;
    parse_limit(&raw)
}

fn detect_cgroup_v1_limit(mountinfo: &str, cgroup: &str) -> Option<u64> {
    let mount = CgroupMount::find(mountinfo, |fstype, opts| {
        fstype == "cgroup" && opts.split(',').any(|o| o == "memory")
    })
    .unwrap_or_else(|| CgroupMount::fallback("/sys/fs/cgroup/memory"));
    let rel = cgroup_v1_memory_path(cgroup).unwrap_or_default();
    let raw = fs::read_to_string(mount.file_for(&rel, "memory.limit_in_bytes")).ok()?;
    parse_limit(&raw).filter(|&limit| limit < CGROUP_V1_UNLIMITED_THRESHOLD)
}

fn detect_system_memory() -> Option<u64> {
    let meminfo = fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo_total(&meminfo)
}

/// `"max"` means unlimited.
fn parse_limit(raw: &str) -> Option<u64> {
    match raw.trim() {
        "max" => None,
        value => value.parse().ok(),
    }
}

fn parse_meminfo_total(meminfo: &str) -> Option<u64> {
    let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

#[derive(Debug, PartialEq, Eq)]
struct CgroupMount {
    root: String,
    mount_point: String,
}

impl CgroupMount {
    fn fallback(mount_point: &str) -> Self {
        Self {
            root: "/".to_string(),
            mount_point: mount_point.to_string(),
        }
    }

    /// Find the first mountinfo line whose filesystem matches. Format:
    /// `id parent major:minor root mountpoint opts ... - fstype source superopts`
    fn find(mountinfo: &str, matches: impl Fn(&str, &str) -> bool) -> Option<Self> {
        mountinfo.lines().find_map(|line| {
            let (pre, post) = line.split_once(" - ")?;
            let mut post_fields = post.split_whitespace();
            let fstype = post_fields.next()?;
            let super_opts = post_fields.nth(1).unwrap_or("");
            if !matches(fstype, super_opts) {
                return None;
            }
            let pre_fields: Vec<&str> = pre.split_whitespace().collect();
            Some(Self {
                root: pre_fields.get(3)?.to_string(),
                mount_point: pre_fields.get(4)?.to_string(),
            })
        })
    }

    /// Path of `file` for the cgroup at `rel`, with the mount's own root
    /// stripped from `rel` (needed inside containers with private cgroup
    /// namespaces).
    fn file_for(&self, rel: &str, file: &str) -> String {
        let root = self.root.trim_matches('/');
        let mut rel = rel.trim_matches('/');
        if !root.is_empty() {
            if let Some(stripped) = rel.strip_prefix(root) {
                rel = stripped.trim_start_matches('/');
            }
        }
        let base = self.mount_point.trim_end_matches('/');
        if rel.is_empty() {
            format!("{base}/{file}")
        } else {
            format!("{base}/{rel}/{file}")
        }
    }
}

/// `0::/path` line of /proc/self/cgroup
fn cgroup_v2_path(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("0::"))
        .map(str::to_string)
}

/// `N:...memory...:/path` line of /proc/self/cgroup
fn cgroup_v1_memory_path(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let mut parts = line.splitn(3, ':');
        let _id = parts.next()?;
        let controllers = parts.next()?;
        let path = parts.next()?;
        controllers
            .split(',')
            .any(|c| c == "memory")
            .then(|| path.to_string())
    })
}

fn compute_reserved_memory(total_bytes: u64) -> u64 {
    (total_bytes / 20).clamp(MIN_RESERVED_MEMORY, MAX_RESERVED_MEMORY)
}

/// Cap `cpu_workers` by how many jobs fit in `available_memory`.
/// Never returns less than one.
pub fn calculate_memory_based_workers(available_memory: Option<u64>, cpu_workers: usize) -> usize {
    let cpu_workers = cpu_workers.max(1);
    let Some(total) = available_memory else {
        return cpu_workers;
    };
    let usable = total.saturating_sub(compute_reserved_memory(total));
    let fit = (usable / ESTIMATED_MEMORY_PER_JOB).clamp(1, MAX_MEMORY_BASED_WORKERS as u64) as usize;
    fit.min(cpu_workers)
}
