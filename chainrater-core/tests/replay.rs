use chainrater_core::{
    contract::{RATING_REMOVED, RATING_SUBMITTED, URI_REVEALED},
    hash_uri,
    stats::{dashboard, uri_stats},
    Deployments, LogPosition, Rating, RatingFilter, RatingsAbi, RatingsState, Selection,
};
use ethers_core::{
    abi::{self, Abi, Token},
    types::{Address, Bytes, Log, H256, U256, U64},
};

fn ratings_abi() -> (RatingsAbi, Abi) {
    let deployments = Deployments::embedded().expect("embedded manifest parses");
    let raw: Abi = serde_json::from_value(deployments.contracts["Ratings"].abi.clone())
        .expect("embedded abi parses");
    (deployments.ratings_abi().expect("ratings abi is complete"), raw)
}

fn topic0(raw: &Abi, name: &str) -> H256 {
    raw.event(name).unwrap().signature()
}

fn log(topics: Vec<H256>, data: Vec<u8>, block: u64, index: u64) -> Log {
    Log {
        topics,
        data: Bytes::from(data),
        block_number: Some(U64::from(block)),
        log_index: Some(U256::from(index)),
        ..Default::default()
    }
}

fn revealed(raw: &Abi, uri: &str, block: u64, index: u64) -> Log {
    log(
        vec![topic0(raw, URI_REVEALED), hash_uri(uri)],
        abi::encode(&[Token::String(uri.to_string())]),
        block,
        index,
    )
}

fn submitted(raw: &Abi, uri: &str, rater: Address, score: u8, stake: u64, block: u64, index: u64) -> Log {
    log(
        vec![topic0(raw, RATING_SUBMITTED), hash_uri(uri), H256::from(rater)],
        abi::encode(&[
            Token::Uint(score.into()),
            Token::Uint(stake.into()),
            Token::Uint(1_000u64.into()),
            Token::Bool(false),
        ]),
        block,
        index,
    )
}

fn removed(raw: &Abi, uri: &str, rater: Address, block: u64, index: u64) -> Log {
    log(
        vec![topic0(raw, RATING_REMOVED), hash_uri(uri), H256::from(rater)],
        abi::encode(&[Token::Bool(false)]),
        block,
        index,
    )
}

#[test]
fn replaying_history_then_live_logs_builds_the_mirror() {
    let (ratings_abi, raw) = ratings_abi();
    let alice = Address::repeat_byte(0xa1);
    let bob = Address::repeat_byte(0xb0);

    let history = vec![
        revealed(&raw, "restaurant://chez-panisse", 1, 0),
        submitted(&raw, "restaurant://chez-panisse", alice, 5, 600, 1, 1),
        submitted(&raw, "restaurant://chez-panisse", bob, 2, 600, 2, 0),
        revealed(&raw, "book://dune", 3, 0),
        submitted(&raw, "book://dune", alice, 4, 600, 3, 1),
        removed(&raw, "book://dune", alice, 4, 0),
    ];

    let mut state = RatingsState::new();
    state.set_constants(1, 1);
    let events = history
        .iter()
        .map(|l| ratings_abi.decode_log(l))
        .collect::<Result<Vec<_>, _>>()
        .expect("history decodes");
    let changes = state.apply_all(events);
    assert_eq!(changes.revealed.len(), 2);
    assert_eq!(changes.submitted.len(), 3);
    assert_eq!(changes.removed.len(), 1);

    // The live watcher may hand over logs the replay already covered.
    let overlap = ratings_abi
        .decode_log(&submitted(&raw, "book://dune", alice, 4, 600, 3, 1))
        .unwrap();
    assert!(state.apply_all(vec![overlap]).is_empty());

    let dune = state
        .get_ratings(&RatingFilter::default().uri("book://dune").rater(alice), 0)
        .unwrap();
    assert!(matches!(dune, Selection::One(Some(Rating::Deleted(_)))));

    let alice_existing = state
        .existing_ratings(&RatingFilter::default().rater(alice), 0)
        .unwrap();
    assert_eq!(alice_existing.len(), 1);
    assert_eq!(alice_existing[0].latest, LogPosition::new(1, 1));

    let existing = state.existing_ratings(&RatingFilter::default(), 0).unwrap();
    let stats = uri_stats(&state, &existing, Some(bob));
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].uri.as_deref(), Some("restaurant://chez-panisse"));
    assert_eq!(stats[0].average_score, 3.5);
    assert!(stats[0].has_current_user_rated);

    assert_eq!(dashboard(&state, &existing).total_value_locked, 1_200);

    // Both restaurant ratings expire at 1_600.
    let expired = state
        .existing_ratings(&RatingFilter::existing().expired(true), 1_601)
        .unwrap();
    assert_eq!(expired.len(), 2);
}

#[test]
fn resubmission_replaces_the_previous_rating() {
    let (ratings_abi, raw) = ratings_abi();
    let alice = Address::repeat_byte(0xa1);

    let mut state = RatingsState::new();
    for l in [
        submitted(&raw, "app://signal", alice, 1, 10, 5, 0),
        submitted(&raw, "app://signal", alice, 5, 20, 9, 0),
    ] {
        state.apply(&ratings_abi.decode_log(&l).unwrap());
    }

    let ratings = state.existing_ratings(&RatingFilter::default(), 0).unwrap();
    assert_eq!(ratings.len(), 1);
    assert_eq!(ratings[0].score, 5);
    assert_eq!(ratings[0].stake, 20);
}
