use super::*;

fn sample_payload() -> [u8; PAYLOAD_LEN] {
    let mut p = [0u8; PAYLOAD_LEN];
    // MajorFrameCount @ offset 30, 4 bytes, big-endian.
    p[30..34].copy_from_slice(&42u32.to_be_bytes());
    // EDACStatusBits @ offset 102: set bit 0 (PacketFifoA SBE) and the
    // error-count byte to 3.
    p[102..106].copy_from_slice(&0x0300_0001u32.to_be_bytes());
    // DFCHousekeepingStatusBits raw @ offset 106: set TDC_StrongPath_Err
    // (bit 17) only.
    p[106..110].copy_from_slice(&(1u32 << 17).to_be_bytes());
    // DFCStatusBits @ offset 111: set SdramMismatchErr (bit 6).
    p[111] = 1 << 6;
    p
}

#[test]
fn test_from_bytes_wrong_length() {
    let payload = vec![0u8; PAYLOAD_LEN - 1];
    let err = MajorFrameSnapshot::from_bytes(&payload).unwrap_err();
    match err {
        MajorFrameError::WrongPayloadLength { expected, actual } => {
            assert_eq!(expected, PAYLOAD_LEN);
            assert_eq!(actual, PAYLOAD_LEN - 1);
        }
    }
}

#[test]
fn test_from_bytes_decodes_fields_and_overrides_housekeeping() {
    let payload = sample_payload();
    let snap = MajorFrameSnapshot::from_bytes(&payload).unwrap();

    assert_eq!(snap.major_frame_count, 42);
    assert_eq!(snap.edac_single_bit_error_count, 3);
    assert!(snap.edac_packet_fifo_a_sbe);
    assert!(!snap.edac_packet_fifo_b_sbe);

    assert!(snap.tdc_strong_path_err);
    assert!(!snap.tdc_weak_path_err);
    // Raw bit is set, but the stored field is the derived OR, not the
    // raw hardware bitfield.
    assert!(snap.dfc_housekeeping_status_bits);

    assert!(snap.sdram_mismatch_err);
    assert!(!snap.did_not_finish_transfer_err);
}

#[test]
fn test_cache_verified_read_hit_and_miss() {
    let mut cache = MajorFrameCache::new();
    let mut payload = sample_payload();
    payload[30..34].copy_from_slice(&256u32.to_be_bytes());
    let snap = MajorFrameSnapshot::from_bytes(&payload).unwrap();
    cache.put(Pce::Pce0, snap.clone());

    // mfc=256 wraps to the same slot as mfc=0; a verified read for 0
    // must miss even though the slot is occupied.
    assert!(cache.get_verified(Pce::Pce0, 0).is_none());
    assert_eq!(cache.get_verified(Pce::Pce0, 256), Some(&snap));

    // Other PCEs' slots are untouched.
    assert!(cache.get_verified(Pce::Pce1, 256).is_none());
}

#[test]
fn test_cache_put_overwrites_slot() {
    let mut cache = MajorFrameCache::new();
    let payload = sample_payload();
    let first = MajorFrameSnapshot::from_bytes(&payload).unwrap();
    cache.put(Pce::Pce2, first);

    let mut payload2 = sample_payload();
    payload2[30..34].copy_from_slice(&42u32.to_be_bytes());
    payload2[111] = 0;
    let second = MajorFrameSnapshot::from_bytes(&payload2).unwrap();
    cache.put(Pce::Pce2, second.clone());

    assert_eq!(cache.get_verified(Pce::Pce2, 42), Some(&second));
}
