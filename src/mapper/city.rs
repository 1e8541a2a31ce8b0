use rusqlite::Row;

use super::{
    collect, delete_versioned, expect_current, first, ids, kept, lost_race, require_new, Mapper,
};
use crate::datatype::{Id, Version};
use crate::entity::{City, Entity, Handle};
use crate::error::{classify, Result};
use crate::sequence::Sequence;
use crate::session::Session;

const SELECT: &str = "select numero, code_postal, nom_ville, version from VILLES";

struct CityRow {
    id: Id,
    zip_code: String,
    name: String,
    version: Version,
}
impl CityRow {
    fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            zip_code: r.get(1)?,
            name: r.get(2)?,
            version: r.get(3)?,
        })
    }
}

pub struct CityMapper<'s, 'db> {
    session: &'s mut Session<'db>,
}

impl<'s, 'db> CityMapper<'s, 'db> {
    pub(crate) fn new(session: &'s mut Session<'db>) -> Self {
        Self { session }
    }

    fn materialize(&mut self, row: CityRow) -> Result<Handle<City>> {
        if let Some(handle) = kept(self.session, row.id) {
            return Ok(handle);
        }
        let restaurants = ids(
            self.session.connection(),
            "select numero from RESTAURANTS where fk_vill = ? order by numero",
            [row.id],
        )?;
        let mut city = City::new(row.zip_code, row.name);
        city.assign(row.id, row.version);
        city.restaurants = restaurants.into_iter().map(Handle::new).collect();
        self.session.kept_cities.put(city);
        Ok(Handle::new(row.id))
    }
    fn materialize_all(&mut self, rows: Vec<CityRow>) -> Result<Vec<Handle<City>>> {
        rows.into_iter().map(|row| self.materialize(row)).collect()
    }

    /// The first city carrying this postal code.
    pub fn find_by_zip_code(&mut self, zip_code: &str) -> Result<Option<Handle<City>>> {
        let row = first(
            self.session.connection(),
            &format!("{SELECT} where code_postal = ? order by numero"),
            [zip_code],
            CityRow::read,
        )?;
        row.map(|row| self.materialize(row)).transpose()
    }
    /// Exact match on the name, ignoring case.
    pub fn find_by_name(&mut self, name: &str) -> Result<Option<Handle<City>>> {
        let row = first(
            self.session.connection(),
            &format!("{SELECT} where upper(nom_ville) = upper(?) order by numero"),
            [name],
            CityRow::read,
        )?;
        row.map(|row| self.materialize(row)).transpose()
    }
    /// Cities whose name contains `part`, ignoring case.
    pub fn find_by_name_like(&mut self, part: &str) -> Result<Vec<Handle<City>>> {
        let rows = collect(
            self.session.connection(),
            &format!("{SELECT} where upper(nom_ville) like upper(?) order by nom_ville, numero"),
            [format!("%{part}%")],
            CityRow::read,
        )?;
        self.materialize_all(rows)
    }
}

impl Mapper for CityMapper<'_, '_> {
    type Entity = City;

    fn find_by_id(&mut self, id: Id) -> Result<Option<Handle<City>>> {
        if let Some(handle) = kept(self.session, id) {
            return Ok(Some(handle));
        }
        let row = first(
            self.session.connection(),
            &format!("{SELECT} where numero = ?"),
            [id],
            CityRow::read,
        )?;
        row.map(|row| self.materialize(row)).transpose()
    }
    fn find_all(&mut self) -> Result<Vec<Handle<City>>> {
        let rows = collect(
            self.session.connection(),
            &format!("{SELECT} order by numero"),
            [],
            CityRow::read,
        )?;
        self.materialize_all(rows)
    }
    fn create(&mut self, mut city: City) -> Result<Handle<City>> {
        require_new(&city)?;
        let db = self.session.connection();
        let id = self.session.allocate(Sequence::Cities)?;
        db.prepare_cached(
            "insert into VILLES (numero, code_postal, nom_ville, version) values (?, ?, ?, 0)",
        )?
        .execute(rusqlite::params![id, city.zip_code, city.name])
        .map_err(|e| classify(e, City::TABLE, "code_postal", &city.zip_code))?;
        city.assign(id, 0);
        city.restaurants.clear();
        tracing::info!(id, name = %city.name, "city created");
        self.session.kept_cities.put(city);
        Ok(Handle::new(id))
    }
    fn update(&mut self, mut city: City) -> Result<Handle<City>> {
        let db = self.session.connection();
        let id = expect_current(db, &city)?;
        let changed = db
            .prepare_cached(
                "
                update VILLES
                    set code_postal = ?, nom_ville = ?, version = version + 1
                    where numero = ? and version = ?
            ",
            )?
            .execute(rusqlite::params![city.zip_code, city.name, id, city.version()])
            .map_err(|e| classify(e, City::TABLE, "nom_ville", &city.name))?;
        if changed == 0 {
            return Err(lost_race::<City>(db, id, city.version()));
        }
        city.assign(id, city.version() + 1);
        if let Some(previous) = self.session.kept_cities.get(id) {
            city.restaurants = previous.restaurants.clone();
        }
        tracing::debug!(id, version = city.version(), "city updated");
        self.session.kept_cities.put(city);
        Ok(Handle::new(id))
    }
    fn delete(&mut self, city: &City) -> Result<bool> {
        let Some(id) = city.id() else {
            return Ok(false);
        };
        let removed = delete_versioned::<City>(self.session.connection(), id, city.version(), "fk_vill")?;
        self.session.kept_cities.evict(id);
        if removed {
            tracing::info!(id, "city deleted");
        }
        Ok(removed)
    }
    fn resolve(&self, handle: Handle<City>) -> Option<&City> {
        self.session.get(handle)
    }
}
