//! Shared test utilities for efiso tests.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use efiso::PipelineConfig;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Test environment with an input, an output dir, a scratch parent and a
/// directory for fake tools.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub root: PathBuf,
    /// Where fake tool scripts live
    pub bin: PathBuf,
    /// Parent for pipeline scratch directories
    pub scratch: PathBuf,
    /// Fake tools copy grub.cfg here when they run
    pub capture: PathBuf,
    pub out_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();

        let bin = root.join("bin");
        let capture = root.join("capture");
        let out_dir = root.join("out");
        for dir in [&bin, &capture, &out_dir] {
            fs::create_dir_all(dir).expect("Failed to create test dir");
        }

        Self {
            _temp_dir: temp_dir,
            scratch: root.join("scratch"),
            root,
            bin,
            capture,
            out_dir,
        }
    }

    /// Write an executable `sh` script into `bin/` and return its path.
    pub fn tool(&self, name: &str, body: &str) -> PathBuf {
        let path = self.bin.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write tool");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod tool");
        path
    }

    /// A stand-in for `xorriso -as mkisofs`: records its argv, captures
    /// grub.cfg, and "masters" by copying BOOTX64.EFI to the `-o` path.
    pub fn fake_xorriso(&self) -> PathBuf {
        let body = format!(
            r#"printf '%s\n' "$@" > "{capture}/xorriso.args"
out=""
tree=""
while [ $# -gt 0 ]; do
    case "$1" in
        -o) out="$2"; shift 2; continue ;;
    esac
    tree="$1"
    shift
done
cp "$tree/boot/grub/grub.cfg" "{capture}/grub.cfg.$(ls "{capture}" | wc -l)"
cp "$tree/EFI/BOOT/BOOTX64.EFI" "$out""#,
            capture = self.capture.display()
        );
        self.tool("xorriso", &body)
    }

    /// A stand-in for `grub-mkrescue`: the tree is the argument before `--`.
    pub fn fake_grub_mkrescue(&self) -> PathBuf {
        let body = format!(
            r#"printf '%s\n' "$@" > "{capture}/grub-mkrescue.args"
out=""
tree=""
while [ $# -gt 0 ]; do
    case "$1" in
        -o) out="$2"; shift 2; continue ;;
        --) break ;;
        -*) ;;
        *) tree="$1" ;;
    esac
    shift
done
cp "$tree/boot/grub/grub.cfg" "{capture}/grub.cfg"
cat "$tree/EFI/BOOT/BOOTX64.EFI" > "$out""#,
            capture = self.capture.display()
        );
        self.tool("grub-mkrescue", &body)
    }

    /// Only ever checked for, never run.
    pub fn fake_mformat(&self) -> PathBuf {
        self.tool("mformat", "exit 0")
    }

    /// Writes a partial image, complains, and exits non-zero.
    pub fn failing_tool(&self, name: &str) -> PathBuf {
        self.tool(
            name,
            r#"while [ $# -gt 0 ]; do
    [ "$1" = "-o" ] && printf partial > "$2"
    shift
done
echo "xorriso : FAILURE : Cannot find boot image" >&2
exit 5"#,
        )
    }

    /// Exits 0 without writing anything.
    pub fn lying_tool(&self, name: &str) -> PathBuf {
        self.tool(name, "echo 'Written to medium : 0 sectors'\nexit 0")
    }

    /// Never finishes on its own.
    pub fn hanging_tool(&self, name: &str) -> PathBuf {
        self.tool(name, "exec sleep 60")
    }

    /// Config pointing at `xorriso` with scratch dirs under this env.
    pub fn config(&self, xorriso: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.tools.xorriso = xorriso.to_string_lossy().into_owned();
        config.scratch_parent = Some(self.scratch.clone());
        config
    }

    /// Entries left in the scratch parent (0 after every run).
    pub fn scratch_entries(&self) -> usize {
        match fs::read_dir(&self.scratch) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.out_dir.join(name)
    }
}

/// A dummy EFI file of `len` bytes with a non-trivial pattern.
pub fn create_dummy_efi(dir: &Path, name: &str, len: usize) -> PathBuf {
    let mut data: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8).collect();
    if len >= 2 {
        data[0] = b'M';
        data[1] = b'Z';
    }
    let path = dir.join(name);
    fs::write(&path, data).expect("Failed to write dummy EFI");
    path
}

/// Every file and directory under `root`, relative, sorted.
pub fn tree_snapshot(root: &Path) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();
    out.sort();
    out
}

pub fn assert_file_exists(path: &Path) {
    assert!(path.is_file(), "Expected file to exist: {}", path.display());
}

pub fn assert_not_exists(path: &Path) {
    assert!(!path.exists(), "Expected path to be absent: {}", path.display());
}
