use std::time::Duration;

use crate::{
    clock::{ManualClock, Millis},
    events::{IgnoreReason, Submission},
    isbn::{PrefixRule, is_valid_isbn},
    observers::{AcceptanceRecorder, ChannelSink},
    scan_state::ScanState,
    stabilizer::{ScanStabilizer, StabilizerConfig},
};

const BOOK: &str = "9780306406157";
const OTHER_BOOK: &str = "0306406152";

/// Helper function to set up a stabilizer with a recorder attached
fn setup_test_stabilizer(config: StabilizerConfig) -> (ScanStabilizer, AcceptanceRecorder) {
    let recorder = AcceptanceRecorder::new();
    let mut stabilizer = ScanStabilizer::with_clock(config, Box::new(ManualClock::default()));
    stabilizer.register_observer(Box::new(recorder.clone()));
    (stabilizer, recorder)
}

/// Feed `code` `times` times, 100 ms apart, starting at `start`
fn feed(stabilizer: &mut ScanStabilizer, code: &str, times: u32, start: Millis) -> Vec<Submission> {
    (0..u64::from(times))
        .map(|i| stabilizer.submit(code, start.saturating_add(i.saturating_mul(100))))
        .collect()
}

#[test]
fn test_initial_state() {
    let (stabilizer, _) = setup_test_stabilizer(StabilizerConfig::default());
    assert_eq!(stabilizer.state(), ScanState::Idle);
    assert_eq!(stabilizer.same_count(), 0);
    assert!(stabilizer.last_accept_at().is_none());
    assert!(stabilizer.get_history().is_empty());
}

#[test]
fn test_end_to_end_scenario() {
    let (mut stabilizer, recorder) = setup_test_stabilizer(StabilizerConfig::default());

    let inputs = ["1234567890123", BOOK, BOOK, BOOK];
    let results: Vec<Submission> = inputs
        .iter()
        .zip([10_000_u64, 10_100, 10_200, 10_300])
        .map(|(code, at)| stabilizer.submit(code, at))
        .collect();

    assert_eq!(
        results.first(),
        Some(&Submission::Ignored(IgnoreReason::Implausible))
    );
    assert_eq!(results.iter().filter(|s| s.is_accepted()).count(), 1);
    assert_eq!(recorder.codes(), vec![BOOK.to_string()]);
    assert!(is_valid_isbn(BOOK));
    assert_eq!(stabilizer.state(), ScanState::Locked(BOOK.to_string()));
}

#[test]
fn test_run_resets_when_candidate_changes() {
    let (mut stabilizer, recorder) = setup_test_stabilizer(StabilizerConfig::default());

    feed(&mut stabilizer, BOOK, 2, 0);
    let switched = stabilizer.submit(OTHER_BOOK, 200);
    assert_eq!(switched, Submission::Ignored(IgnoreReason::Unstable { same_count: 1 }));
    assert_eq!(stabilizer.last_code(), Some(OTHER_BOOK));
    assert!(recorder.accepted().is_empty());
}

#[test]
fn test_implausible_reads_do_not_break_a_run() {
    let (mut stabilizer, recorder) = setup_test_stabilizer(StabilizerConfig::default());

    stabilizer.submit(BOOK, 0);
    stabilizer.submit("5012345678900", 50);
    stabilizer.submit("", 60);
    stabilizer.submit(BOOK, 100);
    assert_eq!(stabilizer.same_count(), 2);
    assert!(stabilizer.submit(BOOK, 200).is_accepted());
    assert_eq!(recorder.accepted().len(), 1);
}

#[test]
fn test_empty_candidate_is_ignored() {
    let (mut stabilizer, _) = setup_test_stabilizer(StabilizerConfig::default());
    assert_eq!(stabilizer.submit("", 0), Submission::Ignored(IgnoreReason::Empty));
    assert_eq!(stabilizer.state(), ScanState::Idle);
}

#[test]
fn test_locked_ignores_everything_until_unlocked() {
    let (mut stabilizer, recorder) = setup_test_stabilizer(StabilizerConfig::default());

    feed(&mut stabilizer, BOOK, 3, 0);
    assert!(stabilizer.is_locked());

    let later = feed(&mut stabilizer, OTHER_BOOK, 5, 10_000);
    assert!(later.iter().all(|s| *s == Submission::Ignored(IgnoreReason::Locked)));
    assert_eq!(recorder.accepted().len(), 1);

    assert!(stabilizer.unlock());
    assert!(!stabilizer.unlock());
    assert_eq!(stabilizer.state(), ScanState::Idle);
    assert!(feed(&mut stabilizer, OTHER_BOOK, 3, 20_000).iter().any(Submission::is_accepted));
    assert_eq!(recorder.codes(), vec![BOOK.to_string(), OTHER_BOOK.to_string()]);
}

#[test]
fn test_cooldown_blocks_second_acceptance() {
    let (mut stabilizer, recorder) = setup_test_stabilizer(StabilizerConfig::default());

    let first = feed(&mut stabilizer, BOOK, 3, 0);
    assert!(first.last().is_some_and(Submission::is_accepted));
    stabilizer.unlock();

    // accepted at 200, still inside the 1200 ms window up to 1399
    let inside = feed(&mut stabilizer, BOOK, 3, 300);
    assert!(inside.iter().all(|s| !s.is_accepted()));
    assert_eq!(
        inside.last(),
        Some(&Submission::Ignored(IgnoreReason::CoolingDown {
            remaining: Duration::from_millis(900)
        }))
    );

    // the run keeps counting while cooling down, so the first read past the
    // window is accepted
    let after = stabilizer.submit(BOOK, 1400);
    assert!(after.is_accepted());
    assert_eq!(recorder.accepted().len(), 2);
    assert_eq!(recorder.accepted().last().map(|a| a.same_count), Some(4));
}

#[test]
fn test_fresh_run_after_cooldown_is_accepted() {
    let (mut stabilizer, recorder) = setup_test_stabilizer(StabilizerConfig::default());

    feed(&mut stabilizer, BOOK, 3, 0);
    stabilizer.unlock();
    let again = feed(&mut stabilizer, BOOK, 3, 5_000);
    assert!(again.last().is_some_and(Submission::is_accepted));
    assert_eq!(recorder.accepted().len(), 2);
}

#[test]
fn test_zero_cooldown_disables_gate() {
    let config = StabilizerConfig::default().with_cooldown(Duration::ZERO);
    let (mut stabilizer, recorder) = setup_test_stabilizer(config);

    feed(&mut stabilizer, BOOK, 3, 0);
    stabilizer.unlock();
    feed(&mut stabilizer, BOOK, 3, 300);
    assert_eq!(recorder.accepted().len(), 2);
}

#[test]
fn test_configurable_threshold() {
    let config = StabilizerConfig::default().with_threshold(8);
    let (mut stabilizer, _) = setup_test_stabilizer(config);

    let results = feed(&mut stabilizer, BOOK, 8, 0);
    let first_accept = results.iter().position(Submission::is_accepted);
    assert_eq!(first_accept, Some(7));
}

#[test]
fn test_zero_threshold_acts_like_one() {
    let config = StabilizerConfig::default().with_threshold(0);
    let (mut stabilizer, _) = setup_test_stabilizer(config);
    assert!(stabilizer.submit(BOOK, 0).is_accepted());
}

#[test]
fn test_prefix_rule_any_accepts_other_ean13() {
    let config = StabilizerConfig::default().with_prefix_rule(PrefixRule::Any);
    let (mut stabilizer, recorder) = setup_test_stabilizer(config);

    feed(&mut stabilizer, "5012345678900", 3, 0);
    assert_eq!(recorder.codes(), vec!["5012345678900".to_string()]);
}

#[test]
fn test_reset_replays_identically() {
    let (mut stabilizer, recorder) = setup_test_stabilizer(StabilizerConfig::default());
    let inputs: [(&str, Millis); 8] = [
        ("1234567890123", 0),
        (BOOK, 100),
        (OTHER_BOOK, 200),
        (BOOK, 300),
        (BOOK, 400),
        (BOOK, 500),
        (BOOK, 600),
        (OTHER_BOOK, 700),
    ];

    let first: Vec<Submission> = inputs.iter().map(|(c, at)| stabilizer.submit(c, *at)).collect();
    stabilizer.reset();
    assert_eq!(stabilizer.state(), ScanState::Idle);
    assert!(stabilizer.last_accept_at().is_none());
    let second: Vec<Submission> = inputs.iter().map(|(c, at)| stabilizer.submit(c, *at)).collect();

    assert_eq!(first, second);
    assert_eq!(recorder.accepted().len(), 2);
    assert_eq!(recorder.accepted().first(), recorder.accepted().last());
}

#[test]
fn test_history_tracking() {
    let (mut stabilizer, _) = setup_test_stabilizer(StabilizerConfig::default());
    feed(&mut stabilizer, BOOK, 3, 0);

    let history = stabilizer.get_history();
    assert_eq!(history.len(), 3);
    assert_eq!(history.first().map(|t| &t.from), Some(&ScanState::Idle));
    assert_eq!(history.last().map(|t| &t.to), Some(&ScanState::Locked(BOOK.to_string())));
    assert_eq!(history.last().map(|t| t.at), Some(200));
}

#[test]
fn test_history_is_bounded() {
    let config = StabilizerConfig::default().with_threshold(1000);
    let (mut stabilizer, _) = setup_test_stabilizer(config);
    stabilizer.set_max_history_size(5);
    feed(&mut stabilizer, BOOK, 20, 0);

    assert_eq!(stabilizer.get_history().len(), 5);
    assert_eq!(
        stabilizer.get_history().last().map(|t| &t.to),
        Some(&ScanState::Accumulating { code: BOOK.to_string(), same_count: 20 })
    );
}

#[test]
fn test_submit_now_reads_clock() {
    let clock = ManualClock::starting_at(1_000);
    let mut stabilizer =
        ScanStabilizer::with_clock(StabilizerConfig::default(), Box::new(clock.clone()));

    for _ in 0..3 {
        clock.advance(100);
        stabilizer.submit_now(BOOK);
    }
    assert_eq!(stabilizer.last_accept_at(), Some(1_300));
}

#[test]
fn test_channel_sink_receives_acceptances() {
    let (sender, receiver) = std::sync::mpsc::channel();
    let mut stabilizer =
        ScanStabilizer::with_clock(StabilizerConfig::default(), Box::new(ManualClock::default()));
    stabilizer.register_observer(Box::new(ChannelSink::new(sender)));

    feed(&mut stabilizer, OTHER_BOOK, 3, 0);
    let received: Vec<String> = receiver.try_iter().map(|a| a.code).collect();
    assert_eq!(received, vec![OTHER_BOOK.to_string()]);
}
