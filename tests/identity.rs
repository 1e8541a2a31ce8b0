use guideresto::config::DatabaseSettings;
use guideresto::entity::{Address, City, Entity, Handle, Restaurant, RestaurantType};
use guideresto::mapper::Mapper;
use guideresto::persist;
use guideresto::session::Session;
use rusqlite::Connection;

fn setup() -> Connection {
    persist::open(&DatabaseSettings::default()).unwrap()
}

fn restaurant(session: &mut Session<'_>, name: &str) -> Handle<Restaurant> {
    let city = match session.cities().find_by_zip_code("2000").unwrap() {
        Some(city) => city,
        None => session.cities().create(City::new("2000", "Neuchâtel")).unwrap(),
    };
    let label = "Italien";
    let restaurant_type = match session.restaurant_types().find_by_label(label).unwrap() {
        Some(t) => t,
        None => session
            .restaurant_types()
            .create(RestaurantType::new(label, None))
            .unwrap(),
    };
    let address = Address {
        street: "Rue du Seyon 1".into(),
        city,
    };
    session
        .restaurants()
        .create(Restaurant::new(name, None, None, address, restaurant_type))
        .unwrap()
}

#[test]
fn same_row_same_handle_within_a_session() {
    let db = setup();
    let mut session = Session::new(&db);
    let created = restaurant(&mut session, "Da Mario");
    session.clear();

    let by_id = session.restaurants().find_by_id(created.id()).unwrap().unwrap();
    let by_name = session.restaurants().find_by_name("da mario").unwrap().unwrap();
    let by_city = session.restaurants().find_by_city_name_like("châtel").unwrap();
    assert_eq!(by_id, by_name);
    assert_eq!(by_city, vec![by_id]);
    assert_eq!(session.cache::<Restaurant>().len(), 1);
}

#[test]
fn mutation_through_one_handle_is_seen_through_the_other() {
    let db = setup();
    let mut session = Session::new(&db);
    let created = restaurant(&mut session, "Da Mario");
    let a = session.restaurants().find_by_id(created.id()).unwrap().unwrap();
    let b = session.restaurants().find_by_name("Da Mario").unwrap().unwrap();

    session.get_mut(a).unwrap().description = Some("Pizzas au feu de bois".into());
    assert_eq!(
        session.get(b).unwrap().description.as_deref(),
        Some("Pizzas au feu de bois")
    );
    // nothing was written yet
    let stored: Option<String> = db
        .query_row(
            "select description from RESTAURANTS where numero = ?",
            [created.id()],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(stored, None);

    session.restaurants().save(b).unwrap();
    assert_eq!(session.get(a).unwrap().version(), 1);
}

#[test]
fn referenced_city_is_shared_by_its_restaurants() {
    let db = setup();
    let mut session = Session::new(&db);
    let first = restaurant(&mut session, "Da Mario");
    let second = restaurant(&mut session, "Chez Gino");
    session.clear();

    let first = session.restaurants().find_by_id(first.id()).unwrap().unwrap();
    let second = session.restaurants().find_by_id(second.id()).unwrap().unwrap();
    let city = session.get(first).unwrap().address.city;
    assert_eq!(city, session.get(second).unwrap().address.city);
    assert_eq!(session.cache::<City>().len(), 1);

    let restaurants: Vec<_> = session.get(city).unwrap().restaurants().collect();
    assert_eq!(restaurants, vec![first, second]);
}

#[test]
fn a_new_session_reads_the_store_again() {
    let db = setup();
    let created = {
        let mut session = Session::new(&db);
        restaurant(&mut session, "Da Mario")
    };
    db.execute(
        "update RESTAURANTS set nom = 'Da Mario e Figli' where numero = ?",
        [created.id()],
    )
    .unwrap();
    let mut session = Session::new(&db);
    let handle = session.restaurants().find_by_id(created.id()).unwrap().unwrap();
    assert_eq!(session.get(handle).unwrap().name, "Da Mario e Figli");
}

#[test]
fn evicted_rows_are_reloaded() {
    let db = setup();
    let mut session = Session::new(&db);
    let city = session.cities().create(City::new("1000", "Lausanne")).unwrap();
    db.execute("update VILLES set nom_ville = 'Lausanne VD' where numero = ?", [city.id()])
        .unwrap();
    let cached = session.cities().find_by_id(city.id()).unwrap().unwrap();
    assert_eq!(session.get(cached).unwrap().name, "Lausanne");

    session.evict::<City>(city.id());
    let reloaded = session.cities().find_by_id(city.id()).unwrap().unwrap();
    assert_eq!(reloaded, cached);
    assert_eq!(session.get(reloaded).unwrap().name, "Lausanne VD");
}

#[test]
fn unknown_ids_are_absent_not_errors() {
    let db = setup();
    let mut session = Session::new(&db);
    assert!(session.cities().find_by_id(404).unwrap().is_none());
    assert!(session.restaurants().find_by_name("Nowhere").unwrap().is_none());
    assert!(session.evaluations().find_by_id(404).unwrap().is_none());
}

#[test]
fn relocating_a_restaurant_in_place_moves_it_between_cities() {
    let db = setup();
    let mut session = Session::new(&db);
    let mario = restaurant(&mut session, "Da Mario");
    let neuchatel = session.get(mario).unwrap().address.city;
    let lausanne = session.cities().create(City::new("1000", "Lausanne")).unwrap();
    let asiatique = session
        .restaurant_types()
        .create(RestaurantType::new("Asiatique", None))
        .unwrap();
    let italien = session.get(mario).unwrap().restaurant_type;

    let kept = session.get_mut(mario).unwrap();
    kept.address.city = lausanne;
    kept.restaurant_type = asiatique;
    session.restaurants().save(mario).unwrap();

    assert_eq!(session.get(neuchatel).unwrap().restaurants().count(), 0);
    assert_eq!(session.get(lausanne).unwrap().restaurants().collect::<Vec<_>>(), vec![mario]);
    assert_eq!(session.get(italien).unwrap().restaurants().count(), 0);
    assert_eq!(session.get(asiatique).unwrap().restaurants().collect::<Vec<_>>(), vec![mario]);

    session.clear();
    let neuchatel = session.cities().find_by_id(neuchatel.id()).unwrap().unwrap();
    assert_eq!(session.get(neuchatel).unwrap().restaurants().count(), 0);
}
