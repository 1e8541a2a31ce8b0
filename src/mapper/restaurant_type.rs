use rusqlite::Row;

use super::{collect, delete_versioned, expect_current, first, ids, kept, lost_race, require_new, Mapper};
use crate::datatype::{Id, Version};
use crate::entity::{Entity, Handle, RestaurantType};
use crate::error::{classify, Result};
use crate::sequence::Sequence;
use crate::session::Session;

const SELECT: &str = "select numero, libelle, description, version from TYPES_GASTRONOMIQUES";

struct TypeRow {
    id: Id,
    label: String,
    description: Option<String>,
    version: Version,
}
impl TypeRow {
    fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            label: r.get(1)?,
            description: r.get(2)?,
            version: r.get(3)?,
        })
    }
}

pub struct RestaurantTypeMapper<'s, 'db> {
    session: &'s mut Session<'db>,
}

impl<'s, 'db> RestaurantTypeMapper<'s, 'db> {
    pub(crate) fn new(session: &'s mut Session<'db>) -> Self {
        Self { session }
    }

    fn materialize(&mut self, row: TypeRow) -> Result<Handle<RestaurantType>> {
        if let Some(handle) = kept(self.session, row.id) {
            return Ok(handle);
        }
        let restaurants = ids(
            self.session.connection(),
            "select numero from RESTAURANTS where fk_type = ? order by numero",
            [row.id],
        )?;
        let mut restaurant_type = RestaurantType::new(row.label, row.description);
        restaurant_type.assign(row.id, row.version);
        restaurant_type.restaurants = restaurants.into_iter().map(Handle::new).collect();
        self.session.kept_restaurant_types.put(restaurant_type);
        Ok(Handle::new(row.id))
    }

    /// Labels are unique regardless of case.
    pub fn find_by_label(&mut self, label: &str) -> Result<Option<Handle<RestaurantType>>> {
        let row = first(
            self.session.connection(),
            &format!("{SELECT} where libelle = ?"),
            [label],
            TypeRow::read,
        )?;
        row.map(|row| self.materialize(row)).transpose()
    }
}

impl Mapper for RestaurantTypeMapper<'_, '_> {
    type Entity = RestaurantType;

    fn find_by_id(&mut self, id: Id) -> Result<Option<Handle<RestaurantType>>> {
        if let Some(handle) = kept(self.session, id) {
            return Ok(Some(handle));
        }
        let row = first(
            self.session.connection(),
            &format!("{SELECT} where numero = ?"),
            [id],
            TypeRow::read,
        )?;
        row.map(|row| self.materialize(row)).transpose()
    }
    fn find_all(&mut self) -> Result<Vec<Handle<RestaurantType>>> {
        let rows = collect(
            self.session.connection(),
            &format!("{SELECT} order by libelle"),
            [],
            TypeRow::read,
        )?;
        rows.into_iter().map(|row| self.materialize(row)).collect()
    }
    fn create(&mut self, mut restaurant_type: RestaurantType) -> Result<Handle<RestaurantType>> {
        require_new(&restaurant_type)?;
        let db = self.session.connection();
        let id = self.session.allocate(Sequence::RestaurantTypes)?;
        db.prepare_cached(
            "insert into TYPES_GASTRONOMIQUES (numero, libelle, description, version) values (?, ?, ?, 0)",
        )?
        .execute(rusqlite::params![id, restaurant_type.label, restaurant_type.description])
        .map_err(|e| classify(e, RestaurantType::TABLE, "libelle", &restaurant_type.label))?;
        restaurant_type.assign(id, 0);
        restaurant_type.restaurants.clear();
        tracing::info!(id, label = %restaurant_type.label, "restaurant type created");
        self.session.kept_restaurant_types.put(restaurant_type);
        Ok(Handle::new(id))
    }
    fn update(&mut self, mut restaurant_type: RestaurantType) -> Result<Handle<RestaurantType>> {
        let db = self.session.connection();
        let id = expect_current(db, &restaurant_type)?;
        let version = restaurant_type.version();
        let changed = db
            .prepare_cached(
                "
                update TYPES_GASTRONOMIQUES
                    set libelle = ?, description = ?, version = version + 1
                    where numero = ? and version = ?
            ",
            )?
            .execute(rusqlite::params![
                restaurant_type.label,
                restaurant_type.description,
                id,
                version
            ])
            .map_err(|e| classify(e, RestaurantType::TABLE, "libelle", &restaurant_type.label))?;
        if changed == 0 {
            return Err(lost_race::<RestaurantType>(db, id, version));
        }
        restaurant_type.assign(id, version + 1);
        if let Some(previous) = self.session.kept_restaurant_types.get(id) {
            restaurant_type.restaurants = previous.restaurants.clone();
        }
        self.session.kept_restaurant_types.put(restaurant_type);
        Ok(Handle::new(id))
    }
    fn delete(&mut self, restaurant_type: &RestaurantType) -> Result<bool> {
        let Some(id) = restaurant_type.id() else {
            return Ok(false);
        };
        let removed = delete_versioned::<RestaurantType>(
            self.session.connection(),
            id,
            restaurant_type.version(),
            "fk_type",
        )?;
        self.session.kept_restaurant_types.evict(id);
        Ok(removed)
    }
    fn resolve(&self, handle: Handle<RestaurantType>) -> Option<&RestaurantType> {
        self.session.get(handle)
    }
}
