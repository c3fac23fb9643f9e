use super::*;

#[test]
fn test_packet_stats_running_average() {
    let mut stats = PacketStats::new();
    stats.update_tag_count(10);
    stats.update_tag_count(20);
    assert_eq!(stats.min_tags, 10);
    assert_eq!(stats.max_tags, 20);
    assert_eq!(stats.sum_tags, 30);
    assert!((stats.avg_tags - 15.0).abs() < 1e-9);
    assert_eq!(stats.pktcnt, 2);
}

#[test]
fn test_transmit_stats_truncated_shot_excluded_from_min() {
    let mut stats = TransmitStats::new();
    stats.update_tag_count(0, 5, false);
    stats.update_tag_count(0, 1, true);
    assert_eq!(stats.min_tags[0], 5);
    assert_eq!(stats.max_tags[0], 5);
}

#[test]
fn test_channel_stats_dead_time_tracks_minimum() {
    let mut stats = ChannelStats::new();
    stats.update_dead_time(3, 2.0);
    stats.update_dead_time(3, 0.5);
    stats.update_dead_time(3, 10.0);
    assert!((stats.dead_time[2] - 0.5).abs() < 1e-9);
}

#[test]
fn test_signal_stats_update_running_average_per_spot() {
    let mut stats = SignalStats::new();
    stats.update(0, 3000.0, 500.0, 3248.0, 1.0, 0.5, 0.0);
    stats.tick();
    stats.update(0, 3010.0, 500.0, 3250.0, 1.0, 0.5, 0.0);
    stats.tick();

    assert!((stats.rws[0] - 3005.0).abs() < 1e-9);
    assert!((stats.sigrng[0] - 3249.0).abs() < 1e-9);
    assert_eq!(stats.statcnt, 2);
    // the weak-spot slot is untouched
    assert_eq!(stats.rws[1], 0.0);
}

#[test]
fn test_locked_stat_snapshot_reflects_mutation() {
    let locked = LockedStat::new(PacketStats::new());
    {
        let mut guard = locked.lock();
        guard.update_tag_count(42);
    }
    let snap = locked.snapshot();
    assert_eq!(snap.sum_tags, 42);
}
