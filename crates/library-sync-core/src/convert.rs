//! Turning source descriptors into tree nodes stamped with the current pass time.

use chrono::{DateTime, Utc};
use library_sync_models::{
    ChildDescriptor, ChildKind, CollectionDescriptor, DetailRecord, EntryDescriptor, EpisodeEntry, ExternalIds,
    LibraryCollection, MovieEntry, SeasonEntry, ShowEntry,
};
use crate::error::SyncError;

pub fn collection_from_descriptor(desc: CollectionDescriptor, now: DateTime<Utc>) -> LibraryCollection {
    let mut collection = LibraryCollection::new(desc.key, desc.title, desc.kind, now);
    collection.agent = desc.agent;
    collection.scanner = desc.scanner;
    collection.language = desc.language;
    collection.uuid = desc.uuid;
    collection.locations = desc.locations;
    collection
}

pub fn show_from_entry(entry: EntryDescriptor, now: DateTime<Utc>) -> ShowEntry {
    let mut show = ShowEntry::new(entry.rating_key, entry.title, now);
    show.key = entry.key;
    show.guid = entry.guid;
    show.summary = entry.summary;
    show.year = entry.year;
    show.content_rating = entry.content_rating;
    show.user_rating = entry.user_rating;
    show.audience_rating = entry.audience_rating;
    show.watched = entry.view_count > 0;
    show.last_viewed_at = entry.last_viewed_at;
    show.added_at = entry.added_at;
    show.updated_at = entry.updated_at;
    show
}

pub fn movie_from_entry(entry: EntryDescriptor, now: DateTime<Utc>) -> MovieEntry {
    let mut movie = MovieEntry::new(entry.rating_key, entry.title, now);
    movie.key = entry.key;
    movie.guid = entry.guid;
    movie.summary = entry.summary;
    movie.year = entry.year;
    movie.content_rating = entry.content_rating;
    movie.user_rating = entry.user_rating;
    movie.audience_rating = entry.audience_rating;
    movie.watched = entry.view_count > 0;
    movie.last_viewed_at = entry.last_viewed_at;
    movie.added_at = entry.added_at;
    movie.updated_at = entry.updated_at;
    movie
}

fn require_index(child: &ChildDescriptor, expected: ChildKind) -> Result<u32, SyncError> {
    if child.kind != expected {
        return Err(SyncError::malformed(
            &child.rating_key,
            format!("expected {:?}, got {:?}", expected, child.kind),
        ));
    }
    child
        .index
        .ok_or_else(|| SyncError::malformed(&child.rating_key, "record has no index"))
}

pub fn season_from_child(child: ChildDescriptor, now: DateTime<Utc>) -> Result<SeasonEntry, SyncError> {
    let number = require_index(&child, ChildKind::Season)?;
    let mut season = SeasonEntry::new(number, now);
    season.title = child.title;
    season.guid = child.guid;
    season.rating_key = child.rating_key;
    Ok(season)
}

pub fn episode_from_child(child: ChildDescriptor, now: DateTime<Utc>) -> Result<EpisodeEntry, SyncError> {
    let number = require_index(&child, ChildKind::Episode)?;
    let mut episode = EpisodeEntry::new(number, child.title, now);
    episode.guid = child.guid;
    episode.rating_key = child.rating_key;
    episode.content_rating = child.content_rating;
    episode.year = child.year;
    episode.watched = child.view_count > 0;
    episode.duration_ms = child.duration_ms;
    episode.last_viewed_at = child.last_viewed_at;
    episode.added_at = child.added_at;
    episode.updated_at = child.updated_at;
    Ok(episode)
}

fn set_if_present(target: &mut String, value: &str) {
    if !value.is_empty() {
        *target = value.to_string();
    }
}

// Ids from the detail record win; ids it no longer carries are kept.
fn refresh_ids(ids: &mut ExternalIds, detail: &DetailRecord) {
    let mut fresh = ExternalIds::from_guids(&detail.alternate_guids);
    fresh.merge(ids);
    *ids = fresh;
}

/// Fill a listed show with its full metadata record.
pub fn apply_show_detail(show: &mut ShowEntry, detail: &DetailRecord) {
    set_if_present(&mut show.title, &detail.title);
    set_if_present(&mut show.summary, &detail.summary);
    set_if_present(&mut show.content_rating, &detail.content_rating);
    set_if_present(&mut show.guid, &detail.guid);
    show.year = detail.year.or(show.year);
    refresh_ids(&mut show.ids, detail);
}

pub fn apply_movie_detail(movie: &mut MovieEntry, detail: &DetailRecord) {
    set_if_present(&mut movie.title, &detail.title);
    set_if_present(&mut movie.summary, &detail.summary);
    set_if_present(&mut movie.content_rating, &detail.content_rating);
    set_if_present(&mut movie.guid, &detail.guid);
    movie.year = detail.year.or(movie.year);
    movie.last_viewed_at = detail.last_viewed_at.or(movie.last_viewed_at);
    movie.added_at = detail.added_at.or(movie.added_at);
    refresh_ids(&mut movie.ids, detail);
}

pub fn apply_episode_detail(episode: &mut EpisodeEntry, detail: &DetailRecord) {
    set_if_present(&mut episode.title, &detail.title);
    set_if_present(&mut episode.content_rating, &detail.content_rating);
    set_if_present(&mut episode.guid, &detail.guid);
    episode.year = detail.year.or(episode.year);
    episode.watched = detail.view_count > 0;
    episode.duration_ms = detail.duration_ms.or(episode.duration_ms);
    episode.last_viewed_at = detail.last_viewed_at.or(episode.last_viewed_at);
    episode.added_at = detail.added_at.or(episode.added_at);
    refresh_ids(&mut episode.ids, detail);
}
