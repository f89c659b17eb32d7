use super::*;
use anyhow::Result;
use byteorder::ByteOrder;
use std::fs::File;
use tempfile::tempdir;

fn names(log: &SnapshotLog) -> Vec<String> {
    log.records().map(|r| r.name_lossy().into_owned()).collect()
}

fn sample() -> Result<SnapshotLog> {
    let log = SnapshotLog::new()
        .add(30, "alpha")?
        .add(10, "beta")?
        .add(20, "gamma")?;
    Ok(log)
}

// -------------------- Empty log --------------------

#[test]
fn empty_log_has_no_buffer_and_max_vlsn() {
    let log = SnapshotLog::new();
    assert!(log.as_bytes().is_empty());
    assert!(log.is_empty());
    assert_eq!(log.len(), 0);
    assert_eq!(log.vlsn(), u64::MAX);
    assert_eq!(log.records().count(), 0);
}

#[test]
fn open_empty_buffer_is_valid() -> Result<()> {
    let mut log = sample()?;
    let mut buf = Vec::new();
    log.open(&mut buf)?;
    assert!(log.is_empty());
    assert_eq!(log.vlsn(), u64::MAX);
    Ok(())
}

#[test]
fn header_with_zero_count_parses() -> Result<()> {
    let mut buf = vec![0u8; HEADER_BYTES];
    let crc = checksum(&buf);
    LittleEndian::write_u32(&mut buf[4..8], crc);

    let log = SnapshotLog::from_bytes(buf)?;
    assert_eq!(log.len(), 0);
    assert_eq!(log.records().count(), 0);
    Ok(())
}

// -------------------- Add --------------------

#[test]
fn add_appends_terminated_record() -> Result<()> {
    let log = SnapshotLog::new().add(7, "snap")?;
    assert_eq!(log.len(), 1);
    assert_eq!(log.vlsn(), 7);

    let rec = log.records().next().unwrap();
    assert_eq!(rec.lsn, 7);
    assert_eq!(rec.raw_name(), b"snap\0");
    assert_eq!(rec.name(), b"snap");
    assert_eq!(log.as_bytes().len(), HEADER_BYTES + RECORD_FIXED_BYTES + 5);
    Ok(())
}

#[test]
fn built_log_carries_crc_in_header_field() -> Result<()> {
    let log = sample()?;
    let bytes = log.as_bytes();
    let header = Header::decode(bytes)?;
    assert_eq!(header.crc, checksum(bytes));
    assert_eq!(byteorder::LittleEndian::read_u32(&bytes[CRC_OFFSET..]), header.crc);
    assert_eq!(header.count, 3);
    assert_eq!(header.vlsn, 10);
    Ok(())
}

#[test]
fn add_preserves_existing_records_in_order() -> Result<()> {
    let log = sample()?;
    assert_eq!(names(&log), vec!["alpha", "beta", "gamma"]);
    let lsns: Vec<u64> = log.records().map(|r| r.lsn).collect();
    assert_eq!(lsns, vec![30, 10, 20]);
    Ok(())
}

#[test]
fn vlsn_tracks_minimum_lsn() -> Result<()> {
    let one = SnapshotLog::new().add(50, "a")?;
    assert_eq!(one.vlsn(), 50);
    let two = one.add(70, "b")?;
    assert_eq!(two.vlsn(), 50);
    let three = two.add(5, "c")?;
    assert_eq!(three.vlsn(), 5);
    Ok(())
}

#[test]
fn add_existing_name_fails_and_both_logs_stay_valid() -> Result<()> {
    let log = SnapshotLog::new().add(1, "x")?;
    let result = log.add(2, "y")?;

    let err = result.add(3, "x").unwrap_err();
    assert!(matches!(err, SnapshotError::AlreadyExists(ref n) if n == "x"));

    assert_eq!(names(&log), vec!["x"]);
    assert_eq!(names(&result), vec!["x", "y"]);
    assert_eq!(result.lsn_of("y"), Some(2));
    SnapshotLog::from_bytes(result.as_bytes().to_vec())?;
    Ok(())
}

#[test]
fn add_rejects_prefix_of_existing_name() -> Result<()> {
    let log = SnapshotLog::new().add(1, "nightly")?;
    assert!(matches!(
        log.add(2, "night"),
        Err(SnapshotError::AlreadyExists(_))
    ));
    // A longer name sharing the prefix is distinct.
    let log = log.add(3, "nightly-2")?;
    assert_eq!(log.len(), 2);
    Ok(())
}

#[test]
fn empty_name_only_fits_an_empty_log() -> Result<()> {
    let log = SnapshotLog::new().add(4, "")?;
    assert_eq!(log.records().next().map(|r| r.raw_name().to_vec()), Some(vec![0u8]));
    assert!(log.contains(""));
    assert!(matches!(
        sample()?.add(5, ""),
        Err(SnapshotError::AlreadyExists(_))
    ));
    Ok(())
}

#[test]
fn add_does_not_mutate_source() -> Result<()> {
    let log = sample()?;
    let before = log.as_bytes().to_vec();
    let _ = log.add(99, "delta")?;
    let _ = log.add(1, "alpha");
    assert_eq!(log.as_bytes(), before.as_slice());
    Ok(())
}

// -------------------- Delete --------------------

#[test]
fn delete_removes_only_matching_record() -> Result<()> {
    let log = sample()?;
    let next = log.delete("beta")?;
    assert_eq!(names(&next), vec!["alpha", "gamma"]);
    assert!(!next.contains("beta"));
    assert_eq!(next.vlsn(), 20);
    Ok(())
}

#[test]
fn delete_missing_fails() -> Result<()> {
    let log = sample()?;
    let err = log.delete("missing").unwrap_err();
    assert!(matches!(err, SnapshotError::NotFound(ref n) if n == "missing"));
    Ok(())
}

#[test]
fn delete_on_empty_log_fails() {
    assert!(matches!(
        SnapshotLog::new().delete("x"),
        Err(SnapshotError::NotFound(_))
    ));
}

#[test]
fn delete_needs_exact_name() -> Result<()> {
    let log = SnapshotLog::new().add(1, "nightly")?;
    assert!(log.delete("night").is_err());
    assert!(log.delete("nightly!").is_err());
    Ok(())
}

#[test]
fn delete_last_record_yields_empty_log() -> Result<()> {
    let log = SnapshotLog::new().add(4, "only")?;
    let next = log.delete("only")?;
    assert!(next.as_bytes().is_empty());
    assert_eq!(next.vlsn(), u64::MAX);
    Ok(())
}

#[test]
fn delete_does_not_mutate_source() -> Result<()> {
    let log = sample()?;
    let before = log.as_bytes().to_vec();
    let _ = log.delete("gamma")?;
    let _ = log.delete("nope");
    assert_eq!(log.as_bytes(), before.as_slice());
    Ok(())
}

// -------------------- Open / round-trip --------------------

#[test]
fn open_round_trip_matches_original() -> Result<()> {
    let log = sample()?;
    let mut buf = log.as_bytes().to_vec();

    let mut reopened = SnapshotLog::new();
    reopened.open(&mut buf)?;

    assert!(buf.is_empty(), "open takes ownership of the caller's buffer");
    assert_eq!(reopened, log);
    assert_eq!(names(&reopened), names(&log));
    assert_eq!(reopened.vlsn(), 10);
    Ok(())
}

#[test]
fn open_replaces_previous_buffer() -> Result<()> {
    let mut log = sample()?;
    let mut other = SnapshotLog::new().add(3, "z")?.into_bytes();
    log.open(&mut other)?;
    assert_eq!(names(&log), vec!["z"]);
    Ok(())
}

#[test]
fn every_single_byte_flip_is_detected() -> Result<()> {
    let log = sample()?;
    let bytes = log.as_bytes();

    for i in HEADER_BYTES..bytes.len() {
        let mut corrupt = bytes.to_vec();
        corrupt[i] ^= 0x5A;
        let err = SnapshotLog::from_bytes(corrupt).unwrap_err();
        assert!(matches!(err, SnapshotError::Corrupt(_)), "byte {} not detected", i);
    }
    Ok(())
}

#[test]
fn failed_open_leaves_log_and_buffer_untouched() -> Result<()> {
    let mut log = sample()?;
    let before = log.clone();

    let mut corrupt = SnapshotLog::new().add(1, "q")?.into_bytes();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xFF;
    let copy = corrupt.clone();

    assert!(log.open(&mut corrupt).is_err());
    assert_eq!(log, before);
    assert_eq!(corrupt, copy);
    Ok(())
}

#[test]
fn truncated_header_is_corrupt() {
    let err = SnapshotLog::from_bytes(vec![1, 2, 3]).unwrap_err();
    assert!(matches!(err, SnapshotError::Corrupt(_)));
}

#[test]
fn framing_errors_with_valid_crc_are_corrupt() -> Result<()> {
    // Claims two records but holds one.
    let mut buf = SnapshotLog::new().add(1, "a")?.into_bytes();
    LittleEndian::write_u32(&mut buf[0..4], 2);
    let crc = checksum(&buf);
    LittleEndian::write_u32(&mut buf[4..8], crc);
    assert!(matches!(
        SnapshotLog::from_bytes(buf),
        Err(SnapshotError::Corrupt(_))
    ));

    // Negative name length.
    let mut buf = SnapshotLog::new().add(1, "a")?.into_bytes();
    LittleEndian::write_i32(&mut buf[HEADER_BYTES + 8..HEADER_BYTES + 12], -1);
    let crc = checksum(&buf);
    LittleEndian::write_u32(&mut buf[4..8], crc);
    assert!(matches!(
        SnapshotLog::from_bytes(buf),
        Err(SnapshotError::Corrupt(_))
    ));
    Ok(())
}

#[test]
fn unterminated_names_from_other_writers_are_accepted() -> Result<()> {
    let mut buf = vec![0u8; HEADER_BYTES];
    buf.write_u64::<LittleEndian>(12)?;
    buf.write_i32::<LittleEndian>(3)?;
    buf.extend_from_slice(b"raw");
    Header {
        count: 1,
        crc: 0,
        vlsn: 12,
    }
    .encode_into(&mut buf);
    let crc = checksum(&buf);
    LittleEndian::write_u32(&mut buf[4..8], crc);

    let log = SnapshotLog::from_bytes(buf)?;
    assert_eq!(log.lsn_of("raw"), Some(12));
    let next = log.delete("raw")?;
    assert!(next.is_empty());
    Ok(())
}

// -------------------- Close --------------------

#[test]
fn close_is_idempotent() -> Result<()> {
    let mut log = sample()?;
    log.close();
    assert!(log.is_empty());
    assert_eq!(log.vlsn(), u64::MAX);
    log.close();
    assert!(log.as_bytes().is_empty());
    Ok(())
}

// -------------------- Reader / writer --------------------

#[test]
fn write_and_read_back_through_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("snapshot.sdss");
    let log = sample()?;

    log.write_to(File::create(&path)?)?;
    let loaded = SnapshotLog::read_from(File::open(&path)?)?;
    assert_eq!(loaded, log);
    Ok(())
}

#[test]
fn empty_log_writes_empty_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("empty.sdss");
    SnapshotLog::new().write_to(File::create(&path)?)?;
    assert_eq!(std::fs::metadata(&path)?.len(), 0);
    let loaded = SnapshotLog::read_from(File::open(&path)?)?;
    assert!(loaded.is_empty());
    Ok(())
}

// -------------------- Sharing --------------------

#[test]
fn old_snapshot_survives_concurrent_readers() -> Result<()> {
    let log = std::sync::Arc::new(sample()?);
    let reader = {
        let log = std::sync::Arc::clone(&log);
        std::thread::spawn(move || names(&log))
    };
    let next = log.delete("alpha")?;
    assert_eq!(reader.join().unwrap(), vec!["alpha", "beta", "gamma"]);
    assert_eq!(names(&next), vec!["beta", "gamma"]);
    Ok(())
}
