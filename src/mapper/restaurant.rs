use rusqlite::{Connection, Row};

use super::{
    collect, conflict, delete_versioned, expect_current, first, ids, kept, lost_race,
    missing_reference, require_new, run_cascade, stored_reference, stored_version, CascadeReport,
    CascadeStep, Mapper, Stored,
};
use crate::datatype::{Id, Version};
use crate::entity::{
    Address, City, Entity, Evaluation, EvaluationKind, Handle, Restaurant, RestaurantType,
};
use crate::error::{classify, GuideError, Result};
use crate::sequence::Sequence;
use crate::session::Session;
use crate::transaction::within_savepoint;

const SELECT: &str = "
    select r.numero, r.nom, r.description, r.site_web, r.adresse, r.fk_vill, r.fk_type, r.version
    from RESTAURANTS r";

/// Dependents removed before the restaurant row itself, in this order.
pub(crate) const RESTAURANT_CASCADE: [CascadeStep; 3] = [
    CascadeStep {
        table: "NOTES",
        column: "fk_comm",
        sql: "delete from NOTES where fk_comm in (select numero from COMMENTAIRES where fk_rest = ?)",
    },
    CascadeStep {
        table: "COMMENTAIRES",
        column: "fk_rest",
        sql: "delete from COMMENTAIRES where fk_rest = ?",
    },
    CascadeStep {
        table: "LIKES",
        column: "fk_rest",
        sql: "delete from LIKES where fk_rest = ?",
    },
];

struct RestaurantRow {
    id: Id,
    name: String,
    description: Option<String>,
    website: Option<String>,
    street: String,
    city: Id,
    restaurant_type: Id,
    version: Version,
}
impl RestaurantRow {
    fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            name: r.get(1)?,
            description: r.get(2)?,
            website: r.get(3)?,
            street: r.get(4)?,
            city: r.get(5)?,
            restaurant_type: r.get(6)?,
            version: r.get(7)?,
        })
    }
}

/// Both kinds of evaluation of one restaurant, in creation order.
fn load_evaluations(db: &Connection, restaurant: Id) -> Result<Vec<Evaluation>> {
    let tagged: Vec<(String, Id)> = collect(
        db,
        "
        select 'LIKES', numero from LIKES where fk_rest = ?1
        union all
        select 'COMMENTAIRES', numero from COMMENTAIRES where fk_rest = ?1
        order by 2
    ",
        [restaurant],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    tagged
        .into_iter()
        .map(|(table, id)| match EvaluationKind::from_table(&table) {
            Some(EvaluationKind::Basic) => Ok(Evaluation::Basic(Handle::new(id))),
            Some(EvaluationKind::Complete) => Ok(Evaluation::Complete(Handle::new(id))),
            None => Err(GuideError::DataCorruption {
                message: format!("evaluation {id} tagged with unknown table {table}"),
            }),
        })
        .collect()
}

pub struct RestaurantMapper<'s, 'db> {
    session: &'s mut Session<'db>,
}

impl<'s, 'db> RestaurantMapper<'s, 'db> {
    pub(crate) fn new(session: &'s mut Session<'db>) -> Self {
        Self { session }
    }

    fn materialize(&mut self, row: RestaurantRow) -> Result<Handle<Restaurant>> {
        if let Some(handle) = kept(self.session, row.id) {
            return Ok(handle);
        }
        let city = self
            .session
            .cities()
            .find_by_id(row.city)?
            .ok_or_else(|| missing_reference::<City>(Restaurant::NAME, row.id, row.city))?;
        let restaurant_type = self
            .session
            .restaurant_types()
            .find_by_id(row.restaurant_type)?
            .ok_or_else(|| {
                missing_reference::<RestaurantType>(Restaurant::NAME, row.id, row.restaurant_type)
            })?;
        let mut restaurant = Restaurant::new(
            row.name,
            row.description,
            row.website,
            Address {
                street: row.street,
                city,
            },
            restaurant_type,
        );
        restaurant.assign(row.id, row.version);
        restaurant.evaluations = load_evaluations(self.session.connection(), row.id)?;
        self.session.kept_restaurants.put(restaurant);
        let handle = Handle::new(row.id);
        self.link(handle, city, restaurant_type);
        Ok(handle)
    }
    fn materialize_all(&mut self, rows: Vec<RestaurantRow>) -> Result<Vec<Handle<Restaurant>>> {
        rows.into_iter().map(|row| self.materialize(row)).collect()
    }
    fn find_many(&mut self, clause: &str, value: impl rusqlite::ToSql) -> Result<Vec<Handle<Restaurant>>> {
        let rows = collect(
            self.session.connection(),
            &format!("{SELECT} {clause}"),
            [value],
            RestaurantRow::read,
        )?;
        self.materialize_all(rows)
    }

    // keeps the inverse sets of kept cities and types in step
    fn link(&mut self, handle: Handle<Restaurant>, city: Handle<City>, restaurant_type: Handle<RestaurantType>) {
        if let Some(city) = self.session.get_mut(city) {
            city.restaurants.insert(handle);
        }
        if let Some(restaurant_type) = self.session.get_mut(restaurant_type) {
            restaurant_type.restaurants.insert(handle);
        }
    }
    fn unlink(&mut self, handle: Handle<Restaurant>, city: Handle<City>, restaurant_type: Handle<RestaurantType>) {
        if let Some(city) = self.session.get_mut(city) {
            city.restaurants.remove(&handle);
        }
        if let Some(restaurant_type) = self.session.get_mut(restaurant_type) {
            restaurant_type.restaurants.remove(&handle);
        }
    }

    // the rows are already gone; drop what the session still holds of them
    fn forget(&mut self, restaurant: &Restaurant) {
        let Some(id) = restaurant.id() else {
            return;
        };
        let previous = self.session.kept_restaurants.evict(id);
        let kept = previous.as_ref().unwrap_or(restaurant);
        for evaluation in &kept.evaluations {
            match *evaluation {
                Evaluation::Basic(handle) => {
                    self.session.kept_basic_evaluations.evict(handle.id());
                }
                Evaluation::Complete(handle) => {
                    if let Some(review) = self.session.kept_complete_evaluations.evict(handle.id()) {
                        for grade in review.grades {
                            self.session.kept_grades.evict(grade.id());
                        }
                    }
                }
            }
        }
        let handle = Handle::new(id);
        self.unlink(handle, kept.address.city, kept.restaurant_type);
        self.unlink(handle, restaurant.address.city, restaurant.restaurant_type);
        tracing::debug!(id, "restaurant already gone");
    }

    fn require_references(&mut self, restaurant: &Restaurant) -> Result<()> {
        let city = restaurant.address.city.id();
        if self.session.cities().find_by_id(city)?.is_none() {
            return Err(GuideError::ConstraintViolation {
                table: Restaurant::TABLE,
                column: "fk_vill",
                value: city.to_string(),
            });
        }
        let restaurant_type = restaurant.restaurant_type.id();
        if self.session.restaurant_types().find_by_id(restaurant_type)?.is_none() {
            return Err(GuideError::ConstraintViolation {
                table: Restaurant::TABLE,
                column: "fk_type",
                value: restaurant_type.to_string(),
            });
        }
        Ok(())
    }

    /// Exact match on the name, ignoring case.
    pub fn find_by_name(&mut self, name: &str) -> Result<Option<Handle<Restaurant>>> {
        let row = first(
            self.session.connection(),
            &format!("{SELECT} where upper(r.nom) = upper(?) order by r.numero"),
            [name],
            RestaurantRow::read,
        )?;
        row.map(|row| self.materialize(row)).transpose()
    }
    pub fn find_by_name_like(&mut self, part: &str) -> Result<Vec<Handle<Restaurant>>> {
        self.find_many(
            "where upper(r.nom) like upper(?) order by r.nom, r.numero",
            format!("%{part}%"),
        )
    }
    pub fn find_by_city_name_like(&mut self, part: &str) -> Result<Vec<Handle<Restaurant>>> {
        self.find_many(
            "join VILLES v on v.numero = r.fk_vill
             where upper(v.nom_ville) like upper(?) order by r.nom, r.numero",
            format!("%{part}%"),
        )
    }
    pub fn find_by_city_id(&mut self, city: Id) -> Result<Vec<Handle<Restaurant>>> {
        self.find_many("where r.fk_vill = ? order by r.numero", city)
    }
    pub fn find_by_type_id(&mut self, restaurant_type: Id) -> Result<Vec<Handle<Restaurant>>> {
        self.find_many("where r.fk_type = ? order by r.numero", restaurant_type)
    }
    pub fn find_by_type_label(&mut self, label: &str) -> Result<Vec<Handle<Restaurant>>> {
        self.find_many(
            "join TYPES_GASTRONOMIQUES t on t.numero = r.fk_type
             where t.libelle = ? order by r.nom, r.numero",
            label.to_string(),
        )
    }

    /// Removes the restaurant with every evaluation and grade attached to it.
    /// Either all of those rows go or none do.
    pub fn delete_cascade(&mut self, restaurant: &Restaurant) -> Result<CascadeReport> {
        let Some(id) = restaurant.id() else {
            return Ok(CascadeReport::default());
        };
        let db = self.session.connection();
        let version = restaurant.version();
        match stored_version::<Restaurant>(db, id, version)? {
            Stored::Current => {}
            Stored::Missing => {
                self.forget(restaurant);
                return Ok(CascadeReport::default());
            }
            Stored::Stale(found) => return Err(conflict::<Restaurant>(id, version, found)),
        }
        let city = stored_reference::<Restaurant>(db, id, "fk_vill")?;
        let restaurant_type = stored_reference::<Restaurant>(db, id, "fk_type")?;
        let grades = ids(
            db,
            "select numero from NOTES where fk_comm in (select numero from COMMENTAIRES where fk_rest = ?)",
            [id],
        )?;
        let complete_evaluations = ids(db, "select numero from COMMENTAIRES where fk_rest = ?", [id])?;
        let basic_evaluations = ids(db, "select numero from LIKES where fk_rest = ?", [id])?;

        let report = within_savepoint(db, "delete_restaurant", || {
            let mut report = CascadeReport::default();
            run_cascade(db, &RESTAURANT_CASCADE, id, &mut report)?;
            if !delete_versioned::<Restaurant>(db, id, version, "fk_rest")? {
                return Err(GuideError::NotFound {
                    entity: Restaurant::NAME,
                    id,
                });
            }
            report.record(Restaurant::TABLE, 1)?;
            Ok(report)
        })?;

        for grade in grades {
            self.session.kept_grades.evict(grade);
        }
        for evaluation in complete_evaluations {
            self.session.kept_complete_evaluations.evict(evaluation);
        }
        for evaluation in basic_evaluations {
            self.session.kept_basic_evaluations.evict(evaluation);
        }
        self.session.kept_restaurants.evict(id);
        self.unlink(Handle::new(id), Handle::new(city), Handle::new(restaurant_type));
        tracing::info!(
            id,
            grades = report.grades,
            complete_evaluations = report.complete_evaluations,
            basic_evaluations = report.basic_evaluations,
            "restaurant deleted"
        );
        Ok(report)
    }
}

impl Mapper for RestaurantMapper<'_, '_> {
    type Entity = Restaurant;

    fn find_by_id(&mut self, id: Id) -> Result<Option<Handle<Restaurant>>> {
        if let Some(handle) = kept(self.session, id) {
            return Ok(Some(handle));
        }
        let row = first(
            self.session.connection(),
            &format!("{SELECT} where r.numero = ?"),
            [id],
            RestaurantRow::read,
        )?;
        row.map(|row| self.materialize(row)).transpose()
    }
    fn find_all(&mut self) -> Result<Vec<Handle<Restaurant>>> {
        let rows = collect(
            self.session.connection(),
            &format!("{SELECT} order by r.nom, r.numero"),
            [],
            RestaurantRow::read,
        )?;
        self.materialize_all(rows)
    }
    fn create(&mut self, mut restaurant: Restaurant) -> Result<Handle<Restaurant>> {
        require_new(&restaurant)?;
        self.require_references(&restaurant)?;
        let db = self.session.connection();
        let id = self.session.allocate(Sequence::Restaurants)?;
        db.prepare_cached(
            "
            insert into RESTAURANTS (numero, nom, description, site_web, adresse, fk_vill, fk_type, version)
                values (?, ?, ?, ?, ?, ?, ?, 0)
        ",
        )?
        .execute(rusqlite::params![
            id,
            restaurant.name,
            restaurant.description,
            restaurant.website,
            restaurant.address.street,
            restaurant.address.city.id(),
            restaurant.restaurant_type.id(),
        ])
        .map_err(|e| classify(e, Restaurant::TABLE, "nom", &restaurant.name))?;
        restaurant.assign(id, 0);
        restaurant.evaluations.clear();
        let (city, restaurant_type) = (restaurant.address.city, restaurant.restaurant_type);
        tracing::info!(id, name = %restaurant.name, "restaurant created");
        self.session.kept_restaurants.put(restaurant);
        let handle = Handle::new(id);
        self.link(handle, city, restaurant_type);
        Ok(handle)
    }
    fn update(&mut self, mut restaurant: Restaurant) -> Result<Handle<Restaurant>> {
        let db = self.session.connection();
        let id = expect_current(db, &restaurant)?;
        self.require_references(&restaurant)?;
        let stored_city = stored_reference::<Restaurant>(db, id, "fk_vill")?;
        let stored_type = stored_reference::<Restaurant>(db, id, "fk_type")?;
        let version = restaurant.version();
        let changed = db
            .prepare_cached(
                "
                update RESTAURANTS
                    set nom = ?, description = ?, site_web = ?, adresse = ?, fk_vill = ?, fk_type = ?,
                        version = version + 1
                    where numero = ? and version = ?
            ",
            )?
            .execute(rusqlite::params![
                restaurant.name,
                restaurant.description,
                restaurant.website,
                restaurant.address.street,
                restaurant.address.city.id(),
                restaurant.restaurant_type.id(),
                id,
                version,
            ])
            .map_err(|e| classify(e, Restaurant::TABLE, "nom", &restaurant.name))?;
        if changed == 0 {
            return Err(lost_race::<Restaurant>(db, id, version));
        }
        restaurant.assign(id, version + 1);
        let handle = Handle::new(id);
        restaurant.evaluations = match self.session.kept_restaurants.evict(id) {
            Some(previous) => previous.evaluations,
            None => load_evaluations(db, id)?,
        };
        self.unlink(handle, Handle::new(stored_city), Handle::new(stored_type));
        let (city, restaurant_type) = (restaurant.address.city, restaurant.restaurant_type);
        self.session.kept_restaurants.put(restaurant);
        self.link(handle, city, restaurant_type);
        tracing::debug!(id, version = version + 1, "restaurant updated");
        Ok(handle)
    }
    fn delete(&mut self, restaurant: &Restaurant) -> Result<bool> {
        Ok(self.delete_cascade(restaurant)?.restaurants == 1)
    }
    fn resolve(&self, handle: Handle<Restaurant>) -> Option<&Restaurant> {
        self.session.get(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grades_go_before_their_evaluations() {
        let order: Vec<&str> = RESTAURANT_CASCADE.iter().map(|step| step.table).collect();
        assert_eq!(order, ["NOTES", "COMMENTAIRES", "LIKES"]);
    }
}
