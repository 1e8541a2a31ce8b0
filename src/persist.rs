// used for persistence
use rusqlite::Connection;
use std::time::Duration;

use crate::config::DatabaseSettings;
use crate::error::Result;
use crate::sequence::Sequence;

// ------------- Schema -------------
// Column names follow the tables the directory has always used. Foreign keys
// are declared without cascades: removing dependents is the mappers' job.
const SCHEMA: &str = "
    create table if not exists SEQUENCES (
        name text not null,
        current_value integer not null default 0,
        constraint referenceable_name primary key (
            name
        )
    );
    create table if not exists VILLES (
        numero integer not null,
        code_postal text not null,
        nom_ville text not null,
        version integer not null default 0,
        constraint referenceable_VILLES primary key (
            numero
        )
    );
    create table if not exists TYPES_GASTRONOMIQUES (
        numero integer not null,
        libelle text not null collate nocase,
        description text null,
        version integer not null default 0,
        constraint referenceable_TYPES_GASTRONOMIQUES primary key (
            numero
        ),
        constraint unique_libelle unique (
            libelle
        )
    );
    create table if not exists CRITERES_EVALUATION (
        numero integer not null,
        nom text not null collate nocase,
        description text null,
        version integer not null default 0,
        constraint referenceable_CRITERES_EVALUATION primary key (
            numero
        ),
        constraint unique_nom unique (
            nom
        )
    );
    create table if not exists RESTAURANTS (
        numero integer not null,
        nom text not null,
        description text null,
        site_web text null,
        adresse text not null,
        fk_vill integer not null,
        fk_type integer not null,
        version integer not null default 0,
        constraint referenceable_RESTAURANTS primary key (
            numero
        ),
        constraint RESTAURANTS_in_VILLES foreign key (
            fk_vill
        ) references VILLES(numero),
        constraint RESTAURANTS_of_TYPES_GASTRONOMIQUES foreign key (
            fk_type
        ) references TYPES_GASTRONOMIQUES(numero)
    );
    create table if not exists LIKES (
        numero integer not null,
        appreciation text not null,
        date_eval text not null,
        adresse_ip text not null,
        fk_rest integer not null,
        version integer not null default 0,
        constraint referenceable_LIKES primary key (
            numero
        ),
        constraint LIKES_for_RESTAURANTS foreign key (
            fk_rest
        ) references RESTAURANTS(numero)
    );
    create table if not exists COMMENTAIRES (
        numero integer not null,
        date_eval text not null,
        commentaire text not null,
        nom_utilisateur text not null,
        fk_rest integer not null,
        version integer not null default 0,
        constraint referenceable_COMMENTAIRES primary key (
            numero
        ),
        constraint COMMENTAIRES_for_RESTAURANTS foreign key (
            fk_rest
        ) references RESTAURANTS(numero)
    );
    create table if not exists NOTES (
        numero integer not null,
        note integer not null,
        fk_comm integer not null,
        fk_crit integer not null,
        version integer not null default 0,
        constraint referenceable_NOTES primary key (
            numero
        ),
        constraint note_between_one_and_five check (
            note between 1 and 5
        ),
        constraint NOTES_of_COMMENTAIRES foreign key (
            fk_comm
        ) references COMMENTAIRES(numero),
        constraint NOTES_on_CRITERES_EVALUATION foreign key (
            fk_crit
        ) references CRITERES_EVALUATION(numero),
        constraint one_note_per_critere unique (
            fk_comm,
            fk_crit
        )
    );
    create index if not exists RESTAURANTS_fk_vill on RESTAURANTS (fk_vill);
    create index if not exists RESTAURANTS_fk_type on RESTAURANTS (fk_type);
    create index if not exists LIKES_fk_rest on LIKES (fk_rest);
    create index if not exists COMMENTAIRES_fk_rest on COMMENTAIRES (fk_rest);
    create index if not exists NOTES_fk_comm on NOTES (fk_comm);
";

/// Creates whatever part of the schema is missing and brings every sequence
/// up to the highest row number already stored, so that rows loaded by other
/// means are never handed out again.
pub fn install(db: &Connection) -> Result<()> {
    db.execute_batch(SCHEMA)?;
    for sequence in Sequence::ALL {
        db.execute(
            "insert or ignore into SEQUENCES (name, current_value) values (?, 0)",
            [sequence.name()],
        )?;
        for table in sequence.tables() {
            let highest: i64 = db.query_row(
                &format!("select coalesce(max(numero), 0) from {table}"),
                [],
                |r| r.get(0),
            )?;
            db.execute(
                "update SEQUENCES set current_value = max(current_value, ?) where name = ?",
                rusqlite::params![highest, sequence.name()],
            )?;
        }
    }
    tracing::debug!("schema installed");
    Ok(())
}

/// Opens the configured store and makes it ready for the mappers.
pub fn open(settings: &DatabaseSettings) -> Result<Connection> {
    let db = match &settings.path {
        Some(path) => Connection::open(path)?,
        None => Connection::open_in_memory()?,
    };
    db.busy_timeout(Duration::from_millis(settings.busy_timeout_ms))?;
    db.pragma_update(None, "foreign_keys", settings.foreign_keys)?;
    install(&db)?;
    tracing::info!(
        path = settings.path.as_deref().unwrap_or(":memory:"),
        foreign_keys = settings.foreign_keys,
        "store opened"
    );
    Ok(db)
}
