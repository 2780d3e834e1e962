//! Read only commands. Everything here is answered from the local mirror except
//! `rating`, which asks the contract.

use chainrater_core::{
    format::{format_eth, format_time_ago, format_time_remaining, format_timestamp, shorten_address},
    search::{search, SearchKind},
    stats::{dashboard, rater_summaries, sort_uri_stats, uri_stats, UriStats},
    ExistingRating, Rating, RatingFilter, UriHash,
};
use ethers_core::types::Address;
use serde::Serialize;

use crate::{
    cli::{RatingsArgs, UrisArgs},
    error::ServiceError,
    print_json,
    ratings::Ratings,
    service::{BlockchainService, ServiceEvent},
};

#[derive(Serialize)]
struct Status {
    status: crate::service::ConnectionStatus,
    chain_id: Option<u64>,
    chain: Option<&'static str>,
    contract: Option<Address>,
    account: Option<Address>,
    uris: usize,
    ratings: usize,
    min_stake: Option<u64>,
    stake_per_second: Option<u64>,
}

fn uri_label(ratings: &Ratings, hash: &UriHash) -> String {
    ratings
        .uri_from_hash(hash)
        .unwrap_or_else(|_| format!("{hash:?}"))
}

fn print_existing(ratings: &Ratings, rating: &ExistingRating, stake_per_second: u64, now: u64) {
    println!(
        "{:<40} {} {}/5 staking {:<16} posted {:<14} expires {}",
        uri_label(ratings, &rating.uri_hash),
        shorten_address(&rating.rater),
        rating.score,
        format_eth(rating.stake),
        format_time_ago(rating.posted, now),
        format_time_remaining(rating.expiration_time(stake_per_second), now),
    );
}

fn account_or_missing(service: &BlockchainService) -> anyhow::Result<Address> {
    Ok(service.account().ok_or(ServiceError::MissingAccount)?)
}

pub fn print_status(service: &BlockchainService, json: bool) -> anyhow::Result<()> {
    let ratings = service.ratings().ok();
    let (uris, rating_count) = ratings
        .as_ref()
        .map_or((0, 0), |r| r.with_state(|s| (s.uri_count(), s.rating_count())));
    let status = Status {
        status: service.status(),
        chain_id: service.chain().map(|c| c.id),
        chain: service.chain().map(|c| c.name),
        contract: ratings.as_ref().map(|r| r.address()),
        account: service.account(),
        uris,
        ratings: rating_count,
        min_stake: ratings.as_ref().and_then(|r| r.min_stake().ok()),
        stake_per_second: ratings.as_ref().and_then(|r| r.stake_per_second().ok()),
    };
    if json {
        return print_json(&status);
    }

    println!("Status: {:?}", status.status);
    if let (Some(name), Some(id)) = (status.chain, status.chain_id) {
        println!("Chain: {name} ({id})");
    }
    if let Some(contract) = status.contract {
        println!("Ratings contract: {contract:?}");
    }
    match status.account {
        Some(account) => println!("Account: {account:?}"),
        None => println!("Account: none (read only)"),
    }
    println!("Cached: {} ratings of {} URIs", status.ratings, status.uris);
    if let (Some(min), Some(rate)) = (status.min_stake, status.stake_per_second) {
        println!("Minimum stake: {}, price per second: {}", format_eth(min), format_eth(rate));
    }
    Ok(())
}

pub async fn print_ratings(
    service: &BlockchainService,
    args: RatingsArgs,
    json: bool,
) -> anyhow::Result<()> {
    let ratings = service.ratings()?;
    let mut filter = RatingFilter {
        expired: args.expired,
        deleted: args.deleted,
        ..Default::default()
    };
    if let Some(uri) = args.uri {
        filter = filter.uri(uri);
    }
    if let Some(hash) = args.uri_hash {
        filter = filter.uri_hash(hash);
    }
    if args.mine {
        filter = filter.rater(account_or_missing(service)?);
    } else if let Some(rater) = args.rater {
        filter = filter.rater(rater);
    }

    let now = ratings.now().await;
    let selected = ratings.get_ratings(&filter, now)?.into_vec();
    if json {
        return print_json(&selected);
    }

    let stake_per_second = ratings.stake_per_second()?;
    for rating in &selected {
        match rating {
            Rating::Existing(rating) => print_existing(&ratings, rating, stake_per_second, now),
            Rating::Deleted(deleted) => println!(
                "{:<40} {} removed",
                uri_label(&ratings, &deleted.uri_hash),
                shorten_address(&deleted.rater),
            ),
        }
    }
    println!("{} ratings", selected.len());
    Ok(())
}

pub async fn print_rating(
    service: &BlockchainService,
    uri: &str,
    rater: Option<Address>,
    json: bool,
) -> anyhow::Result<()> {
    let ratings = service.ratings()?;
    let rater = match rater {
        Some(rater) => rater,
        None => account_or_missing(service)?,
    };
    let rating = ratings.get_rating(uri, rater).await?;
    if json {
        return print_json(&rating);
    }

    match rating {
        Some(rating) => {
            let expires = rating.expiration_time(ratings.stake_per_second()?);
            println!("{uri} rated {}/5 by {rater:?}", rating.score);
            println!("Posted: {}", format_timestamp(rating.posted));
            println!("Stake: {}", format_eth(rating.stake));
            println!("Expires: {}", format_timestamp(expires));
        }
        None => println!("{rater:?} has no rating of {uri}"),
    }
    Ok(())
}

/// Per-URI statistics, sorted and filtered as asked.
pub async fn uri_summaries(
    service: &BlockchainService,
    args: &UrisArgs,
) -> anyhow::Result<Vec<UriStats>> {
    let ratings = service.ratings()?;
    let now = ratings.now().await;
    let existing = ratings.existing_ratings(&RatingFilter::default(), now)?;
    let account = service.account();
    if args.yours && account.is_none() {
        return Err(ServiceError::MissingAccount.into());
    }

    let mut stats = ratings.with_state(|state| uri_stats(state, &existing, account));
    stats.retain(|s| !args.yours || s.has_current_user_rated);
    if let Some(needle) = args.search.as_deref().map(str::to_lowercase) {
        stats.retain(|s| match &s.uri {
            Some(uri) => uri.to_lowercase().contains(&needle),
            None => {
                log::warn!(target: crate::LOG_TARGET, "Skipping unrevealed URI {:?}", s.uri_hash);
                false
            }
        });
    }
    sort_uri_stats(&mut stats, args.sort.into(), args.direction());
    Ok(stats)
}

pub async fn print_uris(
    service: &BlockchainService,
    args: UrisArgs,
    json: bool,
) -> anyhow::Result<()> {
    let stats = uri_summaries(service, &args).await?;
    if json {
        return print_json(&stats);
    }
    for s in &stats {
        print_uri_stats(s);
    }
    println!("{} URIs", stats.len());
    Ok(())
}

fn print_uri_stats(s: &UriStats) {
    let label = s.uri.clone().unwrap_or_else(|| format!("{:?}", s.uri_hash));
    println!(
        "{label:<40} {:.2}/5 from {} ratings (std dev {:.2}), {} staked{}",
        s.average_score,
        s.rating_count,
        s.std_dev,
        format_eth(s.total_stake),
        if s.has_current_user_rated { ", rated by you" } else { "" },
    );
}

pub async fn print_dashboard(service: &BlockchainService, json: bool) -> anyhow::Result<()> {
    let ratings = service.ratings()?;
    let now = ratings.now().await;
    let existing = ratings.existing_ratings(&RatingFilter::default(), now)?;
    let board = ratings.with_state(|state| dashboard(state, &existing));
    if json {
        return print_json(&board);
    }

    println!(
        "Total value locked: {}",
        format_eth(board.total_value_locked)
    );
    for (title, list) in [
        ("Top staked", &board.top_staked),
        ("Top rated", &board.top_rated),
        ("Most controversial", &board.most_controversial),
    ] {
        println!("\n{title}");
        if list.is_empty() {
            println!("  nothing yet");
        }
        list.iter().for_each(print_uri_stats);
    }
    Ok(())
}

pub fn print_people(service: &BlockchainService, json: bool) -> anyhow::Result<()> {
    let ratings = service.ratings()?;
    let summaries = rater_summaries(&ratings.raters(), service.account());
    if json {
        return print_json(&summaries);
    }
    for person in &summaries {
        println!(
            "{:?}{} {} ratings, average {:.2}/5, {} staked",
            person.address,
            if person.is_current_user { " (you)" } else { "" },
            person.rating_count,
            person.average_score,
            format_eth(person.total_stake),
        );
    }
    Ok(())
}

pub async fn print_search(
    service: &BlockchainService,
    query: &str,
    kind: SearchKind,
    json: bool,
) -> anyhow::Result<()> {
    let ratings = service.ratings()?;
    let now = ratings.now().await;
    let results = ratings.with_state(|state| search(state, query, kind, now))?;
    if json {
        return print_json(&results);
    }

    for result in &results {
        let label = result
            .decoded_uri
            .clone()
            .unwrap_or_else(|| format!("{:?}", result.uri_hash));
        match (result.rater, result.expiration_time) {
            (Some(rater), Some(expired)) => println!(
                "{label:<40} {} expired {}, {} reclaimable",
                shorten_address(&rater),
                format_time_ago(expired, now),
                format_eth(result.stake.unwrap_or_default()),
            ),
            _ => println!(
                "{label:<40} {:.2}/5 from {} ratings{}",
                result.average_score,
                result.rating_count,
                if result.is_expired { " (expired)" } else { "" },
            ),
        }
    }
    if results.is_empty() {
        println!("No results");
    }
    Ok(())
}

/// Print rating activity until interrupted.
pub async fn watch(service: &BlockchainService) -> anyhow::Result<()> {
    let mut events = service.subscribe();
    println!("Watching for ratings. Press Ctrl-C to stop.");
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            event = events.recv() => event,
        };
        let event = match event {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                log::warn!(target: crate::LOG_TARGET, "Missed {missed} events");
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
        };
        let Ok(ratings) = service.ratings() else {
            println!("{event:?}");
            continue;
        };
        match event {
            ServiceEvent::RatingsSubmitted(submitted) => {
                for s in submitted {
                    println!(
                        "{} rated {} {}/5 staking {}{}",
                        shorten_address(&s.rater),
                        uri_label(&ratings, &s.uri_hash),
                        s.score,
                        format_eth(s.stake),
                        if s.resubmit { " (resubmitted)" } else { "" },
                    );
                }
            }
            ServiceEvent::RatingsRemoved(removed) => {
                for r in removed {
                    println!(
                        "{} rating of {} was {}",
                        shorten_address(&r.rater),
                        uri_label(&ratings, &r.uri_hash),
                        if r.cleanup { "cleaned up" } else { "removed" },
                    );
                }
            }
            ServiceEvent::UrisRevealed(revealed) => {
                for r in revealed {
                    println!("New URI {}", r.uri);
                }
            }
            other => println!("{other:?}"),
        }
    }
}
