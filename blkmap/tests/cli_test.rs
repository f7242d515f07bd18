// SPDX-License-Identifier: MIT
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const LINE: &str = "Oct 12 03:14:07 host kernel: GEOM_DISK: g_disk_done() failed ad0s1d[READ(offset=131072, length=512)]\n";

const CONFXML: &str = "<mesh><class><name>PART</name><geom><name>ad0s1</name>\
<provider><name>ad0s1d</name><sectorsize>512</sectorsize></provider>\
</geom></class></mesh>";

fn dump_fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../blkmap-ffs/tests/data/ffsinfo_ad0s1d.txt")
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Stand-in tools answering like a host where block 256 belongs to `victim`.
struct FakeHost {
    dir: TempDir,
    victim: PathBuf,
    inode: u64,
    config: PathBuf,
}

impl FakeHost {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let victim = dir.path().join("victim.dat");
        fs::write(&victim, b"data").unwrap();
        let inode = fs::symlink_metadata(&victim).unwrap().ino();

        let sysctl = script(dir.path(), "sysctl", &format!("printf '%s' '{CONFXML}'\n"));
        let ffsinfo = script(
            dir.path(),
            "ffsinfo",
            &format!("cat '{}'\n", dump_fixture().display()),
        );
        let fsdb = script(
            dir.path(),
            "fsdb",
            &format!("cat > /dev/null\necho '256: data block of inode {inode}'\n"),
        );
        let find = script(
            dir.path(),
            "find",
            &format!("printf '%s\\0' '{}'\n", victim.display()),
        );

        let config = dir.path().join("blkmap.toml");
        fs::write(
            &config,
            format!(
                "tool_timeout_secs = 10\n\n[tools]\nsysctl = '{}'\nffsinfo = '{}'\nfsdb = '{}'\nfind = '{}'\n",
                sysctl.display(),
                ffsinfo.display(),
                fsdb.display(),
                find.display()
            ),
        )
        .unwrap();

        Self {
            dir,
            victim,
            inode,
            config,
        }
    }

    fn log(&self, text: &str) -> PathBuf {
        let path = self.dir.path().join("messages");
        fs::write(&path, text).unwrap();
        path
    }
}

fn blkmap(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_blkmap"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn maps_error_to_file() {
    let host = FakeHost::new();
    let log = host.log(LINE);

    let out = blkmap(&[
        "-c",
        host.config.to_str().unwrap(),
        log.to_str().unwrap(),
    ]);

    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(
        stdout(&out),
        format!(
            "GEOM ad0s1d\n\
             ERROR OFFSET 131072 SIZE 512 COUNT 1\n\
             FINDINODE BLOCKS 256\n\
             FINDPATH \"/usr\" INODES {ino}\n\
             PATH \"{path}\" INODE {ino} BLOCKS 256\n",
            ino = host.inode,
            path = host.victim.display()
        )
    );
}

#[test]
fn json_report() {
    let host = FakeHost::new();
    let log = host.log(&LINE.repeat(3));

    let out = blkmap(&[
        "-c",
        host.config.to_str().unwrap(),
        "--format",
        "json",
        "--year",
        "2024",
        log.to_str().unwrap(),
    ]);

    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("\"count\": 3"), "{text}");
    assert!(text.contains("\"first_seen\": \"2024-10-12T03:14:07\""), "{text}");
    assert!(text.contains("\"stage\": \"done\""), "{text}");
}

#[test]
fn missing_tools_abort_before_reading() {
    let out = blkmap(&["/nonexistent/blkmap.log"]).status.success();
    // Either the tools are missing here or the log is; both must fail.
    assert!(!out);

    let host = FakeHost::new();
    let config = host.dir.path().join("missing.toml");
    fs::write(&config, "[tools]\nfsdb = 'blkmap-no-such-fsdb'\n").unwrap();
    let out = blkmap(&["-c", config.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("blkmap-no-such-fsdb"));
}

#[test]
fn strict_turns_device_failures_into_exit_2() {
    let host = FakeHost::new();
    let config = host.dir.path().join("broken.toml");
    fs::write(&config, "[tools]\nffsinfo = '/nonexistent/ffsinfo'\n").unwrap();
    let log = host.log(LINE);
    let base = [
        "--skip-tool-check",
        "--sector-size",
        "512",
        "-c",
        config.to_str().unwrap(),
        log.to_str().unwrap(),
    ];

    let lenient = blkmap(&base);
    assert!(lenient.status.success());
    assert!(stdout(&lenient).contains("FAILED Failed to start tool `/nonexistent/ffsinfo`"));

    let mut args = base.to_vec();
    args.push("--strict");
    assert_eq!(blkmap(&args).status.code(), Some(2));
}

#[test]
fn overflowing_offset_is_fatal() {
    let host = FakeHost::new();
    let log = host.log(
        "GEOM_DISK: g_disk_done() failed ad0s1d[READ(offset=99999999999999999999, length=512)]\n",
    );

    let out = blkmap(&[
        "--skip-tool-check",
        "-c",
        host.config.to_str().unwrap(),
        log.to_str().unwrap(),
    ]);

    assert!(!out.status.success());
    assert!(stdout(&out).is_empty());
    assert!(String::from_utf8_lossy(&out.stderr).contains("line 1"));
}

#[test]
fn rejects_bad_option_values() {
    assert!(!blkmap(&["--skip-tool-check", "--dedup", "fuzzy"]).status.success());
    assert!(!blkmap(&["--skip-tool-check", "--batch-size", "64"]).status.success());
}
