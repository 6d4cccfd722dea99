mod common;

use std::fs;

use netdict::{decode_dump, dump, CaptureFilter, ChangelistFilter, NetDictError};

#[test]
fn one_bad_file_among_five() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("captures");
    let out = dir.path().join("dump");

    let good = [
        ("a.ncap", 1u8),
        ("Input/b.ncap", 2),
        ("Input/Deep/c.ncap", 3),
        ("Physics/d.ncap", 4),
    ];
    for (rel, tag) in &good {
        common::write_capture_file(&src.join(rel), &common::tagged_packets(*tag, 5, 9));
    }
    common::write_truncated_capture(&src.join("Physics/broken.ncap"));

    let summary = dump(&src, &out, &CaptureFilter::new("ncap"), "bin").unwrap();
    assert_eq!(summary.succeeded.len(), 4);
    assert_eq!(summary.failed.len(), 1);
    assert!(!summary.is_clean());
    match &summary.failed[0] {
        NetDictError::DumpIo { path, .. } => assert_eq!(path, &src.join("Physics/broken.ncap")),
        other => panic!("expected DumpIo, got {other:?}"),
    }

    for (rel, tag) in &good {
        let target = out.join(rel).with_extension("bin");
        assert!(summary.succeeded.contains(&target));
        let packets = decode_dump(&fs::read(&target).unwrap()).unwrap();
        let expected: Vec<Vec<u8>> = common::tagged_packets(*tag, 5, 9)
            .iter()
            .map(|p| p.bytes().to_vec())
            .collect();
        assert_eq!(packets, expected);
    }
    assert!(!out.join("Physics/broken.bin").exists());
}

#[test]
fn changelist_limits_dumped_files() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("captures");
    let out = dir.path().join("dump");
    common::write_capture_file(&src.join("srv_cl10.ncap"), &common::tagged_packets(1, 2, 4));
    common::write_capture_file(&src.join("srv_cl11.ncap"), &common::tagged_packets(2, 2, 4));

    let summary = dump(
        &src,
        &out,
        &CaptureFilter::new("ncap").with_changelist(ChangelistFilter::parse("cl10")),
        "bin",
    )
    .unwrap();
    assert!(summary.is_clean());
    assert_eq!(summary.succeeded, vec![out.join("srv_cl10.bin")]);
    assert!(!out.join("srv_cl11.bin").exists());
}

#[test]
fn output_inside_source_is_not_redumped() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().to_path_buf();
    let out = src.join("dump");
    common::write_capture_file(&src.join("a.ncap"), &common::tagged_packets(1, 3, 4));

    let first = dump(&src, &out, &CaptureFilter::new("ncap"), "bin").unwrap();
    let second = dump(&src, &out, &CaptureFilter::new("ncap"), "bin").unwrap();
    assert_eq!(first.succeeded, second.succeeded);
    assert!(second.is_clean());
}

#[test]
fn non_capture_files_are_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("captures");
    let out = dir.path().join("dump");
    common::write_capture_file(&src.join("a.ncap"), &common::tagged_packets(1, 3, 4));
    fs::write(src.join("README.txt"), b"server captures from the soak test").unwrap();
    fs::create_dir_all(src.join("logs")).unwrap();
    fs::write(src.join("logs/empty.log"), b"").unwrap();

    let summary = dump(&src, &out, &CaptureFilter::new("ncap"), "bin").unwrap();
    assert!(summary.is_clean());
    assert_eq!(summary.succeeded, vec![out.join("a.bin")]);
    assert!(!out.join("README.bin").exists());
    assert!(!out.join("logs/empty.bin").exists());
}
