// SPDX-License-Identifier: MIT

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use blkmap_host::scripted::{Reply, ScriptedHost};
use blkmap_host::{Host, HostError, ToolSet};

const DUMP: &str = include_str!("../../blkmap-ffs/tests/data/ffsinfo_ad0s1d.txt");

const CONFXML: &str = "<mesh><class><name>PART</name><geom><name>ad0s1</name>\
<provider><name>ad0s1d</name><sectorsize>512</sectorsize></provider>\
<provider><name>ad0s1e</name><sectorsize>4096</sectorsize></provider>\
</geom></class></mesh>\0";

fn host(ops: ScriptedHost) -> Host<ScriptedHost> {
    Host::new(ops, ToolSet::default())
}

#[test]
fn geometry_and_superblock_are_fetched_once() {
    let h = host(
        ScriptedHost::new()
            .reply("sysctl", Reply::text(CONFXML))
            .reply("ffsinfo", Reply::text(DUMP)),
    );

    for _ in 0..3 {
        assert_eq!(h.geometry("ad0s1d").unwrap().sector_size, 512);
        assert_eq!(h.superblock("ad0s1d").unwrap().frag, 8);
    }
    assert_eq!(h.geometry("ad0s1e").unwrap().sector_size, 4096);

    // One topology fetch serves every device.
    assert_eq!(h.ops().calls_to("sysctl"), 1);
    assert_eq!(h.ops().calls_to("ffsinfo"), 1);
}

#[test]
fn failures_are_cached_too() {
    let h = host(ScriptedHost::new().reply(
        "ffsinfo",
        Reply::Exit {
            code: 1,
            stdout: Vec::new(),
        },
    ));

    let first = h.superblock("ad9").unwrap_err();
    let second = h.superblock("ad9").unwrap_err();
    assert_eq!(first, second);
    assert!(matches!(first, HostError::ExitStatus { code: Some(1), .. }));
    assert_eq!(h.ops().calls_to("ffsinfo"), 1);
}

#[test]
fn unknown_provider() {
    let h = host(ScriptedHost::new().reply("sysctl", Reply::text(CONFXML)));
    assert_eq!(
        h.geometry("da0"),
        Err(HostError::ProviderNotFound("da0".into()))
    );
}

#[test]
fn superblock_missing_fields_is_reported() {
    let h = host(ScriptedHost::new().reply("ffsinfo", Reply::text("bsize int32_t 0x4000\n")));
    match h.superblock("ad0s1d") {
        Err(HostError::Superblock { device, .. }) => assert_eq!(device, "ad0s1d"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn blocks_are_resolved_in_batches_of_32() {
    let blocks: Vec<u64> = (1..=40).collect();
    let h = host(
        ScriptedHost::new()
            .reply_when(
                "fsdb",
                "findblk 1 2",
                Reply::text("1: data block of inode 7\n32: data block of inode 8\n"),
            )
            .reply("fsdb", Reply::text("40: data block of inode 7\n")),
    );

    let resolution = h.resolve_blocks("ad0s1d", &blocks, 32);

    assert_eq!(resolution.batches.len(), 2);
    assert_eq!(resolution.batches[0].len(), 32);
    assert_eq!(resolution.batches[1], (33..=40).collect::<Vec<_>>());
    assert!(resolution.failures.is_empty());
    assert_eq!(resolution.inodes(), BTreeSet::from([7, 8]));
    assert_eq!(
        resolution.blocks_by_inode(),
        BTreeMap::from([(7, vec![1, 40]), (8, vec![32])])
    );

    let calls = h.ops().calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.args == ["-r", "/dev/ad0s1d"]));
    assert!(calls[1].stdin.as_deref().unwrap().starts_with("findblk 33 34"));
    assert!(calls[1].stdin.as_deref().unwrap().ends_with("40\nexit\n"));
}

#[test]
fn failed_batch_does_not_abort_the_others() {
    let blocks: Vec<u64> = (1..=4).collect();
    let h = host(
        ScriptedHost::new()
            .reply_when(
                "fsdb",
                "findblk 1 2\n",
                Reply::Error(HostError::Timeout {
                    tool: "fsdb".into(),
                    secs: 120,
                }),
            )
            .reply("fsdb", Reply::text("4: data block of inode 11\n")),
    );

    let resolution = h.resolve_blocks("ad0s1d", &blocks, 2);

    assert_eq!(resolution.batches, vec![vec![1, 2], vec![3, 4]]);
    assert_eq!(resolution.failures.len(), 1);
    assert_eq!(resolution.failures[0].blocks, vec![1, 2]);
    assert_eq!(resolution.owners, BTreeMap::from([(4, 11)]));
}

#[test]
fn empty_inode_set_runs_no_search() {
    let h = host(ScriptedHost::new());
    let resolution = h.resolve_paths(Path::new("/usr"), &BTreeMap::new()).unwrap();
    assert!(resolution.records.is_empty());
    assert!(h.ops().calls().is_empty());
}

#[test]
fn paths_are_sorted_and_matched_by_their_own_inode() {
    let h = host(
        ScriptedHost::new()
            .reply("find", Reply::text("/usr/lib/libz.so\0/usr/bin/cc\0/usr/gone\0"))
            .inode("/usr/lib/libz.so", 7)
            .inode("/usr/bin/cc", 8),
    );
    let by_inode = BTreeMap::from([(7, vec![1, 40]), (8, vec![32])]);

    let resolution = h.resolve_paths(Path::new("/usr"), &by_inode).unwrap();

    let paths: Vec<&PathBuf> = resolution.records.iter().map(|r| &r.path).collect();
    assert_eq!(
        paths,
        [&PathBuf::from("/usr/bin/cc"), &PathBuf::from("/usr/lib/libz.so")]
    );
    assert_eq!(resolution.records[0].blocks, vec![32]);
    assert_eq!(resolution.records[1].inode, 7);
    assert_eq!(resolution.skipped.len(), 1);

    let find = &h.ops().calls()[0];
    assert_eq!(
        find.command_line(),
        "find -x /usr ( -inum 7 -or -inum 8 ) -print0"
    );
}

#[test]
fn search_failure_without_output_is_an_error() {
    let h = host(ScriptedHost::new().reply(
        "find",
        Reply::Exit {
            code: 1,
            stdout: Vec::new(),
        },
    ));
    let inodes = BTreeSet::from([3]);
    assert!(matches!(
        h.find_paths(Path::new("/usr"), &inodes),
        Err(HostError::ExitStatus { .. })
    ));
}

#[test]
fn search_failure_keeps_partial_output() {
    let h = host(ScriptedHost::new().reply(
        "find",
        Reply::Exit {
            code: 1,
            stdout: b"/usr/a\0".to_vec(),
        },
    ));
    let inodes = BTreeSet::from([3]);
    assert_eq!(
        h.find_paths(Path::new("/usr"), &inodes).unwrap(),
        vec![PathBuf::from("/usr/a")]
    );
}
