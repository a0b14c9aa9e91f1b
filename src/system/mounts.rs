//! Filesystems created during partitioning: mount order and `/etc/fstab`
//!
//! Nothing is mounted until the `/` filesystem exists, since anything
//! mounted earlier would be hidden under it. After that every new
//! filesystem is mounted at once, and filesystems it would cover are
//! unmounted first and remounted on top of it.

use std::cmp::Reverse;

pub const FSTAB: &str = "/etc/fstab";

const FSTAB_HEADER: &str = "#\n# /etc/fstab\n# Created by kickstand\n#\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    /// Block device, e.g. `/dev/sda2`
    pub device: String,
    /// fstab source: `UUID=...` when known, the device otherwise
    pub source: String,
    /// `/boot`, `/` or `swap`
    pub mount_point: String,
    pub fstype: String,
}

impl FsEntry {
    fn is_mounted_fs(&self) -> bool {
        self.mount_point.starts_with('/')
    }

    fn depth(&self) -> usize {
        self.mount_point.split('/').filter(|s| !s.is_empty()).count()
    }

    /// Whether `other` is mounted somewhere below this filesystem
    fn covers(&self, other: &Self) -> bool {
        if !self.is_mounted_fs() || self.mount_point == other.mount_point {
            return false;
        }
        if self.mount_point == "/" {
            return other.is_mounted_fs();
        }
        other
            .mount_point
            .starts_with(&format!("{}/", self.mount_point))
    }

    fn fstab_target(&self) -> &str {
        if self.is_mounted_fs() {
            &self.mount_point
        } else {
            "none"
        }
    }

    fn fstab_line(&self) -> String {
        let pass = match self.mount_point.as_str() {
            "/" => 1,
            _ if self.is_mounted_fs() => 2,
            _ => 0,
        };
        format!(
            "{} {} {} defaults 0 {pass}",
            self.source,
            self.fstab_target(),
            self.fstype
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountAction {
    Mount(FsEntry),
    Unmount(FsEntry),
}

#[derive(Debug, Default)]
pub struct Layout {
    entries: Vec<FsEntry>,
    /// Indexes into `entries`, in mount order
    mounted: Vec<usize>,
}

impl Layout {
    pub fn entries(&self) -> &[FsEntry] {
        &self.entries
    }

    pub fn has_root(&self) -> bool {
        self.entries.iter().any(|e| e.mount_point == "/")
    }

    /// Record a new filesystem and return the mounts that bring the tree up
    /// to date
    pub fn add(&mut self, entry: FsEntry) -> Vec<MountAction> {
        let new = self.entries.len();
        self.entries.push(entry);
        if !self.has_root() {
            return Vec::new();
        }

        let mut actions = Vec::new();

        let mut covered: Vec<usize> = self
            .mounted
            .iter()
            .copied()
            .filter(|&i| self.entries[new].covers(&self.entries[i]))
            .collect();
        covered.sort_by_key(|&i| Reverse(self.entries[i].depth()));
        for &i in &covered {
            actions.push(MountAction::Unmount(self.entries[i].clone()));
        }
        self.mounted.retain(|i| !covered.contains(i));

        let mut pending: Vec<usize> = (0..self.entries.len())
            .filter(|i| self.entries[*i].is_mounted_fs() && !self.mounted.contains(i))
            .collect();
        pending.sort_by_key(|&i| self.entries[i].depth());
        for i in pending {
            actions.push(MountAction::Mount(self.entries[i].clone()));
            self.mounted.push(i);
        }
        actions
    }
}

/// `existing` with the entries for `entries` replaced or appended
///
/// Lines for other mount points are kept as they are.
pub fn render_fstab(existing: &str, entries: &[FsEntry]) -> String {
    let ours = |line: &str| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if line.trim_start().starts_with('#') || fields.len() < 2 {
            return false;
        }
        entries.iter().any(|e| {
            fields[0] == e.source
                || fields[0] == e.device
                || (e.is_mounted_fs() && fields[1] == e.mount_point)
        })
    };

    let mut text = if existing.trim().is_empty() {
        FSTAB_HEADER.to_string()
    } else {
        let mut kept: String = existing
            .lines()
            .filter(|line| !ours(line))
            .map(|line| format!("{line}\n"))
            .collect();
        if kept.is_empty() {
            kept.push_str(FSTAB_HEADER);
        }
        kept
    };

    let mut sorted: Vec<&FsEntry> = entries.iter().collect();
    // Mount order, swap last
    sorted.sort_by_key(|e| (!e.is_mounted_fs(), e.depth()));
    for entry in sorted {
        text.push_str(&entry.fstab_line());
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(device: &str, mount_point: &str, fstype: &str) -> FsEntry {
        FsEntry {
            device: device.to_string(),
            source: device.to_string(),
            mount_point: mount_point.to_string(),
            fstype: fstype.to_string(),
        }
    }

    fn mount_points(actions: &[MountAction]) -> Vec<String> {
        actions
            .iter()
            .map(|a| match a {
                MountAction::Mount(e) => format!("mount {}", e.mount_point),
                MountAction::Unmount(e) => format!("umount {}", e.mount_point),
            })
            .collect()
    }

    #[test]
    fn test_nothing_mounts_before_root() {
        let mut layout = Layout::default();
        assert!(layout.add(entry("/dev/sda1", "/boot", "xfs")).is_empty());
        assert!(layout.add(entry("/dev/sda2", "swap", "swap")).is_empty());

        let actions = layout.add(entry("/dev/sda3", "/", "xfs"));
        assert_eq!(mount_points(&actions), ["mount /", "mount /boot"]);

        let actions = layout.add(entry("/dev/sda4", "/var", "xfs"));
        assert_eq!(mount_points(&actions), ["mount /var"]);
    }

    #[test]
    fn test_parent_mount_remounts_children_on_top() {
        let mut layout = Layout::default();
        layout.add(entry("/dev/sda3", "/", "xfs"));
        layout.add(entry("/dev/sda1", "/boot/efi", "vfat"));
        layout.add(entry("/dev/sda5", "/bootstrap", "xfs"));

        let actions = layout.add(entry("/dev/sda2", "/boot", "xfs"));
        assert_eq!(
            mount_points(&actions),
            ["umount /boot/efi", "mount /boot", "mount /boot/efi"]
        );
    }

    #[test]
    fn test_render_fresh_fstab() {
        let mut root = entry("/dev/sda3", "/", "xfs");
        root.source = "UUID=3f1c".to_string();
        let text = render_fstab(
            "",
            &[
                entry("/dev/sda1", "/boot/efi", "vfat"),
                entry("/dev/sda2", "swap", "swap"),
                root,
            ],
        );
        assert_eq!(
            text,
            format!(
                "{FSTAB_HEADER}UUID=3f1c / xfs defaults 0 1\n\
                 /dev/sda1 /boot/efi vfat defaults 0 2\n\
                 /dev/sda2 none swap defaults 0 0\n"
            )
        );
    }

    #[test]
    fn test_render_replaces_only_managed_lines() {
        let existing = "# keep me\n\
                        /dev/vda1 / ext4 defaults 1 1\n\
                        nfs:/export /srv nfs defaults 0 0\n";
        let text = render_fstab(existing, &[entry("/dev/sda3", "/", "xfs")]);
        assert_eq!(
            text,
            "# keep me\n\
             nfs:/export /srv nfs defaults 0 0\n\
             /dev/sda3 / xfs defaults 0 1\n"
        );
        // Rendering again changes nothing
        assert_eq!(render_fstab(&text, &[entry("/dev/sda3", "/", "xfs")]), text);
    }
}
