use guideresto::config::DatabaseSettings;
use guideresto::entity::{City, Entity, EvaluationCriteria, RestaurantType};
use guideresto::error::GuideError;
use guideresto::mapper::Mapper;
use guideresto::persist;
use guideresto::session::Session;
use rusqlite::Connection;

fn setup() -> Connection {
    persist::open(&DatabaseSettings::default()).unwrap()
}

#[test]
fn updates_bump_the_version() {
    let db = setup();
    let mut session = Session::new(&db);
    let city = session.cities().create(City::new("2000", "Neuchâtel")).unwrap();
    assert_eq!(session.get(city).unwrap().version(), 0);

    session.get_mut(city).unwrap().name = "Neuchatel".into();
    session.cities().save(city).unwrap();
    session.get_mut(city).unwrap().zip_code = "2001".into();
    session.cities().save(city).unwrap();

    let (name, version): (String, i64) = db
        .query_row(
            "select nom_ville, version from VILLES where numero = ?",
            [city.id()],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(name, "Neuchatel");
    assert_eq!(version, 2);
    assert_eq!(session.get(city).unwrap().version(), 2);
}

#[test]
fn stale_update_is_a_conflict() {
    let db = setup();
    let mut session = Session::new(&db);
    let handle = session.cities().create(City::new("2000", "Neuchâtel")).unwrap();
    let mut first = session.get(handle).cloned().unwrap();
    let mut second = first.clone();

    first.name = "Neuchatel".into();
    session.cities().update(first).unwrap();
    second.name = "Neuenburg".into();
    let err = session.cities().update(second).unwrap_err();
    assert!(err.is_conflict());
    match err {
        GuideError::Conflict {
            expected, found, ..
        } => assert_eq!((expected, found), (0, 1)),
        other => panic!("unexpected {other:?}"),
    }
    // the first write stands
    assert_eq!(session.get(handle).unwrap().name, "Neuchatel");
}

#[test]
fn interleaved_sessions_conflict() {
    let db = setup();
    let id = {
        let mut session = Session::new(&db);
        session
            .restaurant_types()
            .create(RestaurantType::new("Italien", None))
            .unwrap()
            .id()
    };
    let mut reader = Session::new(&db);
    let mut writer = Session::new(&db);
    let stale = reader.restaurant_types().find_by_id(id).unwrap().unwrap();
    let fresh = writer.restaurant_types().find_by_id(id).unwrap().unwrap();

    writer.get_mut(fresh).unwrap().description = Some("Pâtes et pizzas".into());
    writer.restaurant_types().save(fresh).unwrap();

    reader.get_mut(stale).unwrap().description = Some("Cuisine italienne".into());
    let err = reader.restaurant_types().save(stale).unwrap_err();
    assert!(err.is_conflict());

    // reloading picks up the new version and the retry succeeds
    reader.evict::<RestaurantType>(id);
    let reloaded = reader.restaurant_types().find_by_id(id).unwrap().unwrap();
    reader.get_mut(reloaded).unwrap().description = Some("Cuisine italienne".into());
    reader.restaurant_types().save(reloaded).unwrap();
    assert_eq!(reader.get(reloaded).unwrap().version(), 2);
}

#[test]
fn stale_delete_is_a_conflict_and_keeps_the_row() {
    let db = setup();
    let mut session = Session::new(&db);
    let handle = session
        .evaluation_criteria()
        .create(EvaluationCriteria::new("Service", None))
        .unwrap();
    let stale = session.get(handle).cloned().unwrap();
    session.get_mut(handle).unwrap().description = Some("Accueil".into());
    session.evaluation_criteria().save(handle).unwrap();

    let err = session.evaluation_criteria().delete(&stale).unwrap_err();
    assert!(err.is_conflict());
    let remaining: i64 = db
        .query_row("select count(*) from CRITERES_EVALUATION", [], |r| r.get(0))
        .unwrap();
    assert_eq!(remaining, 1);
}

#[test]
fn updating_a_vanished_row_is_not_found() {
    let db = setup();
    let mut session = Session::new(&db);
    let handle = session.cities().create(City::new("1000", "Lausanne")).unwrap();
    let kept = session.get(handle).cloned().unwrap();
    db.execute("delete from VILLES where numero = ?", [handle.id()]).unwrap();

    let err = session.cities().update(kept.clone()).unwrap_err();
    assert!(matches!(err, GuideError::NotFound { .. }));
    assert!(!session.cities().delete(&kept).unwrap());
}

#[test]
fn entities_are_created_once() {
    let db = setup();
    let mut session = Session::new(&db);
    let handle = session.cities().create(City::new("1000", "Lausanne")).unwrap();
    let kept = session.get(handle).cloned().unwrap();
    assert!(matches!(
        session.cities().create(kept),
        Err(GuideError::Invalid(_))
    ));
    let err = session.cities().update(City::new("1200", "Genève")).unwrap_err();
    assert!(matches!(err, GuideError::Invalid(_)));
}
