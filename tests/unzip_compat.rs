mod common;

use std::process::Command;
use tempfile::tempdir;

// Saves an edited document and calls `unzip -t` on it.
// If `unzip` is not present on the system, the test will be skipped.

#[test]
fn unzip_compatibility() {
    use odt_image_replacer::Document;

    // Check if `unzip` exists by trying to run `unzip -v`.
    let check = Command::new("unzip").arg("-v").output();
    if check.is_err() {
        eprintln!("skipping test: `unzip` not found");
        return;
    }

    let dir = tempdir().unwrap();
    let odt_path = dir.path().join("compat.odt");

    {
        let mut doc = Document::from_bytes(common::standard_odt()).unwrap();
        doc.replace_image_by_tag("image1", "Pictures/new.png", vec![0x89; 4096])
            .unwrap();
        // a moderately large picture so the archive is non-trivial
        doc.add_picture("big.bin", vec![0u8; 1024 * 1024]).unwrap();
        doc.save(&odt_path).unwrap();
    }

    // Run `unzip -t` to test archive integrity
    let output = Command::new("unzip")
        .arg("-t")
        .arg(&odt_path)
        .output()
        .expect("failed to run unzip");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "unzip reported failure: {} {}",
        stdout,
        stderr
    );
    assert!(stdout.contains("mimetype"));
    assert!(stdout.contains("Pictures/new.png"));
}
