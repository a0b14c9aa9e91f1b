//! Disk layout through parted, wipefs and mkfs
//!
//! Partitions are laid out in document order after the last partition that
//! survived `clearpart`. A partition without `--ondisk` goes on the first
//! cleared drive. New filesystems are mounted under the target root and
//! recorded in its `/etc/fstab`.

use super::mounts::{FSTAB, FsEntry, Layout, MountAction, render_fstab};
use super::{device_path, in_target, read_optional, write_file};
use crate::config::Commands;
use crate::runner;
use anyhow::anyhow;
use provisioner::{
    CapabilityError, CapabilityResult, ClearScope, ClearSpec, DiskTool, PartitionSpec,
};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

const DEFAULT_FSTYPE: &str = "xfs";
const DEFAULT_LABEL: &str = "gpt";

/// Filesystems `clearpart --linux` removes
const LINUX_FSTYPES: &[&str] = &["ext2", "ext3", "ext4", "xfs", "btrfs", "swap", "LVM2_member"];

/// Next free offset and the partition numbers in use on one disk
#[derive(Debug, Clone, PartialEq, Eq)]
struct Cursor {
    start_mib: u64,
    numbers: BTreeSet<u32>,
    full: bool,
}

impl Default for Cursor {
    fn default() -> Self {
        // 1 MiB alignment gap for the label
        Self {
            start_mib: 1,
            numbers: BTreeSet::new(),
            full: false,
        }
    }
}

impl Cursor {
    /// Continue after the partitions already on the disk
    fn after(table: &[TableEntry]) -> Self {
        Self {
            start_mib: table.iter().map(|p| p.end_mib).max().unwrap_or(0).max(1),
            numbers: table.iter().map(|p| p.number).collect(),
            full: false,
        }
    }

    /// parted hands out the lowest free number
    fn next_number(&self) -> u32 {
        let limit = u32::try_from(self.numbers.len()).unwrap_or(u32::MAX - 1) + 1;
        (1..=limit)
            .find(|n| !self.numbers.contains(n))
            .unwrap_or(limit)
    }
}

/// One row of `parted -m unit MiB print`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TableEntry {
    number: u32,
    end_mib: u64,
}

pub struct Parted {
    parted: String,
    wipefs: String,
    mkfs: String,
    mount: String,
    umount: String,
    root: PathBuf,
    zero: AtomicBool,
    drives: Mutex<Vec<String>>,
    cursors: Mutex<HashMap<String, Cursor>>,
    layout: Mutex<Layout>,
}

impl Parted {
    pub fn new(commands: &Commands, root: &Path) -> Self {
        Self {
            parted: commands.parted.clone(),
            wipefs: commands.wipefs.clone(),
            mkfs: commands.mkfs.clone(),
            mount: commands.mount.clone(),
            umount: commands.umount.clone(),
            root: root.to_path_buf(),
            zero: AtomicBool::new(false),
            drives: Mutex::new(Vec::new()),
            cursors: Mutex::new(HashMap::new()),
            layout: Mutex::new(Layout::default()),
        }
    }

    /// Partitions currently on `drive`; empty for a disk without a label
    fn table(&self, drive: &str) -> CapabilityResult<Vec<TableEntry>> {
        let args: Vec<String> = ["-s", "-m", drive, "unit", "MiB", "print"]
            .iter()
            .map(ToString::to_string)
            .collect();
        match runner::run_capture(&self.parted, &args) {
            Ok(output) => Ok(parse_table(&output)),
            Err(e) if e.to_string().contains("unrecognised disk label") => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn remove(&self, drive: &str, partition: &str) -> CapabilityResult {
        let number = partition_number(partition).ok_or_else(|| {
            CapabilityError::failed(format!("cannot tell the partition number of {partition}"))
        })?;
        self.wipe(partition)?;
        runner::run_capture(&self.parted, &rm_args(drive, number))?;
        log::info!("clearpart: removed {partition}");
        Ok(())
    }

    /// Mount a new filesystem when its place in the tree exists and update
    /// fstab
    fn record(&self, entry: FsEntry) -> CapabilityResult {
        let mut layout = self.layout.lock().map_err(poisoned)?;
        for action in layout.add(entry) {
            match action {
                MountAction::Mount(e) => {
                    let target = in_target(&self.root, &e.mount_point);
                    fs::create_dir_all(&target).map_err(|err| {
                        anyhow!("Failed to create {}: {err}", target.display())
                    })?;
                    runner::run_capture(
                        &self.mount,
                        &[e.device.clone(), target.display().to_string()],
                    )?;
                }
                MountAction::Unmount(e) => {
                    let target = in_target(&self.root, &e.mount_point);
                    runner::run_capture(&self.umount, &[target.display().to_string()])?;
                }
            }
        }

        if layout.has_root() {
            let fstab = in_target(&self.root, FSTAB);
            let existing = read_optional(&fstab)?;
            write_file(&fstab, &render_fstab(&existing, layout.entries()))?;
        }
        Ok(())
    }

    fn wipe(&self, device: &str) -> CapabilityResult {
        runner::run_capture(&self.wipefs, &["--all".to_string(), device.to_string()])?;
        Ok(())
    }

    fn target_disk(&self, spec: &PartitionSpec) -> CapabilityResult<String> {
        if let Some(disk) = &spec.disk {
            return Ok(device_path(disk));
        }
        let drives = self.drives.lock().map_err(poisoned)?;
        drives.first().cloned().ok_or_else(|| {
            CapabilityError::failed(format!(
                "no disk for partition {}: add --ondisk or clearpart --drives",
                spec.mount_point
            ))
        })
    }
}

impl DiskTool for Parted {
    fn zero_mbr(&self) -> CapabilityResult {
        // Takes effect when the drives are cleared
        self.zero.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self, spec: &ClearSpec) -> CapabilityResult {
        let drives: Vec<String> = if spec.drives.is_empty() {
            list_disks()?
        } else {
            spec.drives.iter().map(|d| device_path(d)).collect()
        };
        *self.drives.lock().map_err(poisoned)? = drives.clone();

        match spec.scope {
            ClearScope::None => {
                log::info!("clearpart: keeping existing partitions");
            }
            ClearScope::All => {
                let label = spec.disk_label.as_deref().unwrap_or(DEFAULT_LABEL);
                for drive in &drives {
                    if spec.init_label || self.zero.load(Ordering::SeqCst) {
                        self.wipe(drive)?;
                    }
                    runner::run_capture(&self.parted, &mklabel_args(drive, label))?;
                }
            }
            ClearScope::Linux => {
                for drive in &drives {
                    for partition in linux_partitions(drive)? {
                        self.remove(drive, &partition)?;
                    }
                }
            }
        }

        let mut cursors = self.cursors.lock().map_err(poisoned)?;
        for drive in &drives {
            let cursor = match spec.scope {
                ClearScope::All => Cursor::default(),
                ClearScope::Linux | ClearScope::None => Cursor::after(&self.table(drive)?),
            };
            cursors.insert(drive.clone(), cursor);
        }
        Ok(())
    }

    fn partition(&self, spec: &PartitionSpec) -> CapabilityResult {
        let disk = self.target_disk(spec)?;

        let (args, device) = {
            let mut cursors = self.cursors.lock().map_err(poisoned)?;
            if !cursors.contains_key(&disk) {
                let cursor = Cursor::after(&self.table(&disk)?);
                cursors.insert(disk.clone(), cursor);
            }
            let cursor = cursors.entry(disk.clone()).or_default();
            let (args, next, number) = mkpart_args(&disk, spec, cursor)?;
            *cursor = next;
            (args, partition_device(&disk, number))
        };
        runner::run_capture(&self.parted, &args)?;

        if spec.format {
            let (program, args) = mkfs_command(&self.mkfs, spec, &device);
            runner::run_capture(&program, &args)?;
        }

        if spec.mount_point.starts_with('/') || spec.mount_point == "swap" {
            let source = fs_source(&device);
            self.record(FsEntry {
                device,
                source,
                mount_point: spec.mount_point.clone(),
                fstype: fstab_type(spec).to_string(),
            })?;
        }
        Ok(())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> CapabilityError {
    CapabilityError::failed("disk state lock poisoned")
}

/// `/dev/sda` + 2 = `/dev/sda2`, `/dev/nvme0n1` + 2 = `/dev/nvme0n1p2`
fn partition_device(disk: &str, number: u32) -> String {
    if disk.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{disk}p{number}")
    } else {
        format!("{disk}{number}")
    }
}

fn fstype(spec: &PartitionSpec) -> &str {
    match spec.fstype.as_deref() {
        Some(fstype) => fstype,
        None if spec.mount_point == "swap" => "swap",
        None => DEFAULT_FSTYPE,
    }
}

/// Filesystem type as mount and fstab name it
fn fstab_type(spec: &PartitionSpec) -> &str {
    match fstype(spec) {
        "efi" => "vfat",
        other => other,
    }
}

/// `UUID=...` for a formatted device, the device itself when blkid has no
/// answer
fn fs_source(device: &str) -> String {
    let args = ["-s", "UUID", "-o", "value", device].map(String::from);
    match runner::run_capture("blkid", &args) {
        Ok(uuid) if !uuid.is_empty() => format!("UUID={uuid}"),
        _ => {
            log::debug!("No UUID for {device}, using the device path");
            device.to_string()
        }
    }
}

/// `/dev/sda2` is 2, `/dev/nvme0n1p3` is 3
fn partition_number(device: &str) -> Option<u32> {
    let digits = device.len() - device.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    device[device.len() - digits..].parse().ok()
}

fn parse_table(output: &str) -> Vec<TableEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.trim_end_matches(';').split(':');
            let number = fields.next()?.parse().ok()?;
            let _start = fields.next()?;
            let end: f64 = fields.next()?.strip_suffix("MiB")?.parse().ok()?;
            Some(TableEntry {
                number,
                end_mib: end.ceil() as u64,
            })
        })
        .collect()
}

fn rm_args(drive: &str, number: u32) -> Vec<String> {
    vec![
        "-s".to_string(),
        drive.to_string(),
        "rm".to_string(),
        number.to_string(),
    ]
}

fn mklabel_args(drive: &str, label: &str) -> Vec<String> {
    ["-s", drive, "mklabel", label]
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// parted arguments for the next partition, the cursor after it and the
/// new partition's number
fn mkpart_args(
    disk: &str,
    spec: &PartitionSpec,
    cursor: &Cursor,
) -> CapabilityResult<(Vec<String>, Cursor, u32)> {
    if cursor.full {
        return Err(CapabilityError::failed(format!(
            "no space left on {disk} for {}: an earlier partition grows to fill it",
            spec.mount_point
        )));
    }

    let start = cursor.start_mib;
    let size = spec.size_mib.unwrap_or(0);
    let (end, next_start, full) = match (spec.grow, spec.max_size_mib) {
        (true, Some(max)) => {
            let end_mib = start + max.max(size);
            (format!("{end_mib}MiB"), end_mib, false)
        }
        (true, None) => ("100%".to_string(), start, true),
        (false, _) => {
            let end_mib = start + size;
            (format!("{end_mib}MiB"), end_mib, false)
        }
    };

    let parted_fs = match fstype(spec) {
        "swap" => "linux-swap",
        "vfat" | "efi" => "fat32",
        other => other,
    };
    let args = vec![
        "-s".to_string(),
        "-a".to_string(),
        "optimal".to_string(),
        disk.to_string(),
        "mkpart".to_string(),
        if spec.primary { "primary" } else { "logical" }.to_string(),
        parted_fs.to_string(),
        format!("{start}MiB"),
        end,
    ];
    let number = cursor.next_number();
    let mut numbers = cursor.numbers.clone();
    numbers.insert(number);
    let next = Cursor {
        start_mib: next_start,
        numbers,
        full,
    };
    Ok((args, next, number))
}

/// Filesystem builder and its arguments
fn mkfs_command(mkfs: &str, spec: &PartitionSpec, device: &str) -> (String, Vec<String>) {
    let fstype = fstype(spec);
    let mut args = Vec::new();
    if let Some(label) = &spec.label {
        args.push("-L".to_string());
        args.push(label.clone());
    }
    if let Some(options) = &spec.fs_options {
        args.extend(options.split_whitespace().map(String::from));
    }
    args.push(device.to_string());

    let program = match fstype {
        "swap" => "mkswap".to_string(),
        "efi" => format!("{mkfs}.vfat"),
        other => format!("{mkfs}.{other}"),
    };
    (program, args)
}

fn list_disks() -> CapabilityResult<Vec<String>> {
    let output = runner::run_capture("lsblk", &["-dnpo".to_string(), "NAME,TYPE".to_string()])?;
    let disks: Vec<String> = output
        .lines()
        .filter_map(|line| match line.split_whitespace().collect::<Vec<_>>()[..] {
            [name, "disk"] => Some(name.to_string()),
            _ => None,
        })
        .collect();
    if disks.is_empty() {
        return Err(anyhow!("lsblk reported no disks").into());
    }
    Ok(disks)
}

fn linux_partitions(drive: &str) -> CapabilityResult<Vec<String>> {
    let output = runner::run_capture(
        "lsblk",
        &[
            "-lnpo".to_string(),
            "NAME,TYPE,FSTYPE".to_string(),
            drive.to_string(),
        ],
    )?;
    Ok(output
        .lines()
        .filter_map(|line| match line.split_whitespace().collect::<Vec<_>>()[..] {
            [name, "part", fstype] if LINUX_FSTYPES.iter().any(|f| *f == fstype) => Some(name.to_string()),
            _ => None,
        })
        .collect())
}
