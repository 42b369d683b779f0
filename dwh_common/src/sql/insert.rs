//! `INSERT ... SELECT` statements which fill the star schema from staging.
//!
//! Every statement skips keys which are already present, and keeps only one
//! row per key from the staging data, so the whole insert stage can be run
//! more than once without adding rows.

use super::Table;
use crate::prelude::*;

const INSERT_TIME: &str = "INSERT INTO time (start_time, hour, day, week, month, year, weekday)
SELECT start_time,
    EXTRACT(hour FROM start_time),
    EXTRACT(day FROM start_time),
    EXTRACT(week FROM start_time),
    EXTRACT(month FROM start_time),
    EXTRACT(year FROM start_time),
    EXTRACT(dow FROM start_time)
FROM (
    SELECT DISTINCT TIMESTAMP 'epoch' + ts / 1000 * INTERVAL '1 second' AS start_time
    FROM staging_events
    WHERE page = 'NextSong' AND ts IS NOT NULL
) plays
WHERE start_time NOT IN (SELECT start_time FROM time);";

// Users change level over time, so keep their most recent event.
const INSERT_USERS: &str = "INSERT INTO users (user_id, first_name, last_name, gender, level)
SELECT user_id, first_name, last_name, gender, level
FROM (
    SELECT userId AS user_id,
        firstName AS first_name,
        lastName AS last_name,
        gender,
        level,
        ROW_NUMBER() OVER (PARTITION BY userId ORDER BY ts DESC) AS rn
    FROM staging_events
    WHERE page = 'NextSong' AND userId IS NOT NULL
) latest
WHERE rn = 1
AND user_id NOT IN (SELECT user_id FROM users);";

const INSERT_ARTISTS: &str = "INSERT INTO artists (artist_id, name, location, latitude, longitude)
SELECT artist_id, name, location, latitude, longitude
FROM (
    SELECT artist_id,
        artist_name AS name,
        artist_location AS location,
        artist_latitude AS latitude,
        artist_longitude AS longitude,
        ROW_NUMBER() OVER (PARTITION BY artist_id ORDER BY artist_name) AS rn
    FROM staging_songs
    WHERE artist_id IS NOT NULL
) one_per_artist
WHERE rn = 1
AND artist_id NOT IN (SELECT artist_id FROM artists);";

const INSERT_SONGS: &str = "INSERT INTO songs (song_id, title, artist_id, year, duration)
SELECT song_id, title, artist_id, year, duration
FROM (
    SELECT song_id,
        title,
        artist_id,
        year,
        duration,
        ROW_NUMBER() OVER (PARTITION BY song_id ORDER BY title) AS rn
    FROM staging_songs
    WHERE song_id IS NOT NULL
) one_per_song
WHERE rn = 1
AND song_id NOT IN (SELECT song_id FROM songs);";

// Plays whose song we can't find in the song metadata are dropped. A play is
// identified by (start_time, user_id, session_id, song_id), and duplicate
// events for the same play keep only the latest.
const INSERT_SONGPLAYS: &str = "INSERT INTO songplays (start_time, user_id, level, song_id, artist_id, session_id, location, user_agent)
SELECT start_time, user_id, level, song_id, artist_id, session_id, location, user_agent
FROM (
    SELECT TIMESTAMP 'epoch' + e.ts / 1000 * INTERVAL '1 second' AS start_time,
        e.userId AS user_id,
        e.level,
        s.song_id,
        s.artist_id,
        e.sessionId AS session_id,
        e.location,
        e.userAgent AS user_agent,
        ROW_NUMBER() OVER (
            PARTITION BY TIMESTAMP 'epoch' + e.ts / 1000 * INTERVAL '1 second',
                e.userId, e.sessionId, s.song_id
            ORDER BY e.ts DESC, e.itemInSession DESC, s.artist_id
        ) AS rn
    FROM staging_events e
    JOIN staging_songs s ON e.song = s.title AND e.artist = s.artist_name
    WHERE e.page = 'NextSong' AND e.userId IS NOT NULL
) plays
WHERE rn = 1
AND NOT EXISTS (
    SELECT 1 FROM songplays p
    WHERE p.start_time = plays.start_time
    AND p.user_id = plays.user_id
    AND p.session_id = plays.session_id
    AND p.song_id = plays.song_id
);";

/// The statement which populates `table` from the staging tables.
pub fn insert_sql(table: &Table) -> Result<&'static str> {
    match table.name {
        "time" => Ok(INSERT_TIME),
        "users" => Ok(INSERT_USERS),
        "artists" => Ok(INSERT_ARTISTS),
        "songs" => Ok(INSERT_SONGS),
        "songplays" => Ok(INSERT_SONGPLAYS),
        other => Err(format_err!("don't know how to populate table {}", other)),
    }
}
