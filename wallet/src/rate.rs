//! Commands that write to the Ratings contract.

use anyhow::{anyhow, bail};
use chainrater_core::{
    format::{format_duration, format_eth, format_timestamp, MIN_DURATION_SECONDS, SECONDS_IN_WEEK},
    hash_uri,
    search::{search, SearchKind},
    types::{duration_for_stake, expiration_time, stake_for_duration},
    uri, Rating, RatingFilter, Score,
};
use ethers_core::{types::Address, utils::parse_ether};

use crate::{
    cli::SubmitArgs,
    error::ServiceError,
    print_json,
    service::BlockchainService,
    LOG_TARGET,
};

/// Work out the stake for a submission from an explicit ETH amount or a number of
/// weeks, enforcing the minimum duration and the contract's minimum stake.
pub fn stake_for_submission(
    stake_eth: Option<&str>,
    weeks: Option<u64>,
    min_stake: u64,
    stake_per_second: u64,
) -> anyhow::Result<u64> {
    let stake = match stake_eth {
        Some(eth) => {
            let wei = parse_ether(eth).map_err(|e| anyhow!("invalid stake {eth}: {e}"))?;
            u64::try_from(wei).map_err(|_| anyhow!("stake {eth} ETH is too large"))?
        }
        None => {
            let duration = weeks
                .unwrap_or(1)
                .checked_mul(SECONDS_IN_WEEK)
                .ok_or_else(|| anyhow!("duration is too long"))?;
            stake_for_duration(duration, stake_per_second)
                .ok_or_else(|| anyhow!("stake for {} is too large", format_duration(duration)))?
        }
    };

    if let Some(duration) = duration_for_stake(stake, stake_per_second) {
        if duration < MIN_DURATION_SECONDS {
            bail!(
                "a stake of {} only lasts {}, the minimum is {}",
                format_eth(stake),
                format_duration(duration),
                format_duration(MIN_DURATION_SECONDS)
            );
        }
    }
    if stake < min_stake {
        bail!(
            "stake {} is below the minimum of {}",
            format_eth(stake),
            format_eth(min_stake)
        );
    }
    Ok(stake)
}

pub async fn submit(service: &BlockchainService, args: SubmitArgs, json: bool) -> anyhow::Result<()> {
    let ratings = service.ratings()?;
    let uri = uri::format_uri(args.uri.trim());
    if !uri::validate(&uri) {
        bail!(
            "{uri} is not a valid URI. Use one of {} followed by a name",
            uri::VALID_SCHEMAS.join(", ")
        );
    }
    let score = Score::new(args.score)?;
    let stake_per_second = ratings.stake_per_second()?;
    let stake = stake_for_submission(
        args.stake.as_deref(),
        args.weeks,
        ratings.min_stake()?,
        stake_per_second,
    )?;

    let receipt = ratings.submit_rating(&uri, score, stake).await?;
    ratings.cache_uri(&uri);
    if json {
        return print_json(&serde_json::json!({
            "uri": uri,
            "transaction": receipt.transaction_hash,
            "stake": stake,
        }));
    }

    let now = ratings.now().await;
    println!(
        "Rated {uri} {}/5 staking {} in transaction {:?}",
        score.get(),
        format_eth(stake),
        receipt.transaction_hash
    );
    println!(
        "The rating expires around {}",
        format_timestamp(expiration_time(now, stake, stake_per_second))
    );
    Ok(())
}

pub async fn remove(service: &BlockchainService, uri: &str, json: bool) -> anyhow::Result<()> {
    let ratings = service.ratings()?;
    let rater = service.account().ok_or(ServiceError::MissingAccount)?;
    let cached = ratings.get_ratings(&RatingFilter::default().uri(uri).rater(rater), 0)?;
    if !cached.into_vec().iter().any(|r| !r.is_deleted()) {
        log::warn!(target: LOG_TARGET, "No rating of {uri} by {rater:?} in the cache, trying anyway");
    }

    let receipt = ratings.remove_rating(uri, rater).await?;
    if json {
        return print_json(&serde_json::json!({ "uri": uri, "transaction": receipt.transaction_hash }));
    }
    println!("Removed your rating of {uri} in transaction {:?}", receipt.transaction_hash);
    Ok(())
}

/// With a URI and a rater, remove that expired rating. Otherwise list what can be
/// cleaned up, narrowed by whichever of the two was given.
pub async fn cleanup(
    service: &BlockchainService,
    uri: Option<String>,
    rater: Option<Address>,
    json: bool,
) -> anyhow::Result<()> {
    let ratings = service.ratings()?;
    let now = ratings.now().await;

    if let (Some(uri), Some(rater)) = (&uri, rater) {
        let cached = ratings.get_ratings(&RatingFilter::default().uri(uri.as_str()).rater(rater), now)?;
        match cached.into_vec().into_iter().next() {
            Some(Rating::Existing(rating)) if !rating.is_expired(ratings.stake_per_second()?, now) => {
                log::warn!(target: LOG_TARGET, "The rating of {uri} by {rater:?} looks unexpired");
            }
            Some(Rating::Existing(_)) => {}
            _ => log::warn!(target: LOG_TARGET, "No rating of {uri} by {rater:?} in the cache"),
        }
        let receipt = ratings.remove_rating(uri, rater).await?;
        if json {
            return print_json(&serde_json::json!({ "uri": uri, "transaction": receipt.transaction_hash }));
        }
        println!("Cleaned up {uri} by {rater:?} in transaction {:?}", receipt.transaction_hash);
        return Ok(());
    }

    let wanted_hash = uri.as_deref().map(hash_uri);
    let candidates: Vec<_> = ratings
        .with_state(|state| search(state, "", SearchKind::Cleanup, now))?
        .into_iter()
        .filter(|c| wanted_hash.map_or(true, |hash| c.uri_hash == hash))
        .filter(|c| rater.map_or(true, |rater| c.rater == Some(rater)))
        .collect();
    if json {
        return print_json(&candidates);
    }
    for c in &candidates {
        println!(
            "{} by {:?}: {} can be reclaimed",
            c.decoded_uri.clone().unwrap_or_else(|| format!("{:?}", c.uri_hash)),
            c.rater.unwrap_or_default(),
            format_eth(c.stake.unwrap_or_default()),
        );
    }
    println!("{} ratings can be cleaned up", candidates.len());
    Ok(())
}
