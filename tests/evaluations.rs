use chrono::NaiveDate;
use guideresto::config::DatabaseSettings;
use guideresto::datatype::Score;
use guideresto::entity::{
    Address, BasicEvaluation, City, CompleteEvaluation, Evaluation, EvaluationCriteria,
    EvaluationKind, Grade, Handle, Restaurant, RestaurantType,
};
use guideresto::error::GuideError;
use guideresto::mapper::{EvaluationScope, LikeTally, Mapper};
use guideresto::persist;
use guideresto::session::Session;
use rusqlite::Connection;

fn setup() -> Connection {
    persist::open(&DatabaseSettings::default()).unwrap()
}

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

fn restaurant(session: &mut Session<'_>) -> Handle<Restaurant> {
    let city = session.cities().create(City::new("2000", "Neuchâtel")).unwrap();
    let restaurant_type = session
        .restaurant_types()
        .create(RestaurantType::new("Italien", None))
        .unwrap();
    let address = Address {
        street: "Rue du Seyon 1".into(),
        city,
    };
    session
        .restaurants()
        .create(Restaurant::new("Da Mario", None, None, address, restaurant_type))
        .unwrap()
}

fn review(
    session: &mut Session<'_>,
    restaurant: Handle<Restaurant>,
    username: &str,
    visited: NaiveDate,
) -> Handle<CompleteEvaluation> {
    session
        .complete_evaluations()
        .create(CompleteEvaluation::new(restaurant, "Bien", username, visited))
        .unwrap()
}

fn vote(
    session: &mut Session<'_>,
    restaurant: Handle<Restaurant>,
    likes: bool,
    visited: NaiveDate,
) -> Handle<BasicEvaluation> {
    session
        .basic_evaluations()
        .create(BasicEvaluation::new(restaurant, likes, "10.0.0.1", visited))
        .unwrap()
}

#[test]
fn both_kinds_share_one_numbering() {
    let db = setup();
    let mut session = Session::new(&db);
    let restaurant = restaurant(&mut session);
    let like = vote(&mut session, restaurant, true, date(5, 1));
    let reviewed = review(&mut session, restaurant, "alice", date(5, 2));
    let dislike = vote(&mut session, restaurant, false, date(5, 3));
    assert!(like.id() < reviewed.id() && reviewed.id() < dislike.id());
}

#[test]
fn abstract_lookup_builds_the_right_kind() {
    let db = setup();
    let mut session = Session::new(&db);
    let restaurant = restaurant(&mut session);
    let like = vote(&mut session, restaurant, true, date(5, 1));
    let reviewed = review(&mut session, restaurant, "alice", date(5, 2));
    session.clear();

    let found = session.evaluations().find_by_id(like.id()).unwrap().unwrap();
    assert_eq!(found, Evaluation::Basic(like));
    let found = session.evaluations().find_by_id(reviewed.id()).unwrap().unwrap();
    assert_eq!(found.kind(), EvaluationKind::Complete);
    assert_eq!(session.get(reviewed).unwrap().username, "alice");

    // the restaurant came along, with both evaluations in creation order
    let kept = session.get(restaurant).unwrap();
    assert_eq!(
        kept.evaluations(),
        &[Evaluation::Basic(like), Evaluation::Complete(reviewed)]
    );
    assert_eq!(session.evaluations().find_all().unwrap().len(), 2);
}

#[test]
fn reviews_come_most_recent_first() {
    let db = setup();
    let mut session = Session::new(&db);
    let restaurant = restaurant(&mut session);
    let march = review(&mut session, restaurant, "alice", date(3, 14));
    let june = review(&mut session, restaurant, "bob", date(6, 1));
    let january = review(&mut session, restaurant, "carol", date(1, 9));
    let also_june = review(&mut session, restaurant, "dave", date(6, 1));
    session.clear();

    let reviews = session
        .complete_evaluations()
        .find_by_restaurant_id(restaurant.id())
        .unwrap();
    assert_eq!(reviews, vec![also_june, june, march, january]);
}

#[test]
fn merged_evaluations_are_ordered_by_visit() {
    let db = setup();
    let mut session = Session::new(&db);
    let restaurant = restaurant(&mut session);
    let old_like = vote(&mut session, restaurant, true, date(2, 1));
    let recent_review = review(&mut session, restaurant, "alice", date(4, 1));
    let middle_dislike = vote(&mut session, restaurant, false, date(3, 1));

    let all = session
        .evaluations()
        .find_by_restaurant_id(restaurant.id(), EvaluationScope::All)
        .unwrap();
    assert_eq!(
        all,
        vec![
            Evaluation::Complete(recent_review),
            Evaluation::Basic(middle_dislike),
            Evaluation::Basic(old_like),
        ]
    );
    let dates: Vec<NaiveDate> = all
        .iter()
        .map(|e| session.evaluation(*e).unwrap().visit_date())
        .collect();
    assert_eq!(dates, vec![date(4, 1), date(3, 1), date(2, 1)]);

    let basic = session
        .evaluations()
        .find_by_restaurant_id(restaurant.id(), EvaluationScope::Basic)
        .unwrap();
    assert_eq!(basic, vec![Evaluation::Basic(old_like), Evaluation::Basic(middle_dislike)]);
    let complete = session
        .evaluations()
        .find_by_restaurant_id(restaurant.id(), EvaluationScope::Complete)
        .unwrap();
    assert_eq!(complete, vec![Evaluation::Complete(recent_review)]);
}

#[test]
fn like_counts_match_the_rows() {
    let db = setup();
    let mut session = Session::new(&db);
    let restaurant = restaurant(&mut session);
    let id = restaurant.id();
    assert_eq!(session.basic_evaluations().count_likes(id).unwrap(), 0);
    assert_eq!(session.basic_evaluations().count_dislikes(id).unwrap(), 0);
    assert_eq!(session.basic_evaluations().tally(id).unwrap(), LikeTally::default());

    for likes in [true, true, false, true, false] {
        vote(&mut session, restaurant, likes, date(5, 1));
    }
    let likes = session.basic_evaluations().count_likes(id).unwrap();
    let dislikes = session.basic_evaluations().count_dislikes(id).unwrap();
    assert_eq!((likes, dislikes), (3, 2));
    let total = session.basic_evaluations().find_by_restaurant_id(id).unwrap().len();
    assert_eq!(likes + dislikes, total);
    assert_eq!(
        session.basic_evaluations().tally(id).unwrap(),
        LikeTally {
            likes: 3,
            dislikes: 2
        }
    );
}

#[test]
fn legacy_appreciation_codes_are_read() {
    let db = setup();
    let mut session = Session::new(&db);
    let restaurant = restaurant(&mut session);
    let id = restaurant.id();
    vote(&mut session, restaurant, true, date(5, 1));
    db.execute(
        "insert into LIKES (numero, appreciation, date_eval, adresse_ip, fk_rest) values (900, '1', '2024-05-02', '10.0.0.9', ?)",
        [id],
    )
    .unwrap();
    db.execute(
        "insert into LIKES (numero, appreciation, date_eval, adresse_ip, fk_rest) values (901, '0', '2024-05-03', '10.0.0.9', ?)",
        [id],
    )
    .unwrap();

    assert_eq!(session.basic_evaluations().count_likes(id).unwrap(), 2);
    assert_eq!(session.basic_evaluations().count_dislikes(id).unwrap(), 1);
    let tally = session.basic_evaluations().tally(id).unwrap();
    assert_eq!((tally.likes, tally.dislikes), (2, 1));

    let written: String = db
        .query_row(
            "select appreciation from LIKES where fk_rest = ? order by numero limit 1",
            [id],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(written, "T");
}

#[test]
fn unknown_appreciation_code_is_corruption() {
    let db = setup();
    let mut session = Session::new(&db);
    let restaurant = restaurant(&mut session);
    db.execute(
        "insert into LIKES (numero, appreciation, date_eval, adresse_ip, fk_rest) values (900, 'Y', '2024-05-02', '10.0.0.9', ?)",
        [restaurant.id()],
    )
    .unwrap();
    let err = session.basic_evaluations().find_by_id(900).unwrap_err();
    assert!(matches!(err, GuideError::DataCorruption { .. }), "{err}");
}

#[test]
fn one_grade_per_criterion() {
    let db = setup();
    let mut session = Session::new(&db);
    let restaurant = restaurant(&mut session);
    let reviewed = review(&mut session, restaurant, "alice", date(5, 1));
    let service = session
        .evaluation_criteria()
        .create(EvaluationCriteria::new("Service", None))
        .unwrap();
    session
        .grades()
        .create(Grade::new(Score::new(5).unwrap(), reviewed, service))
        .unwrap();
    let err = session
        .grades()
        .create(Grade::new(Score::new(2).unwrap(), reviewed, service))
        .unwrap_err();
    assert!(err.is_constraint_violation());
    assert_eq!(session.get(reviewed).unwrap().grades().count(), 1);

    session.clear();
    let grades = session.grades().find_by_evaluation_id(reviewed.id()).unwrap();
    assert_eq!(grades.len(), 1);
    let grade = session.get(grades[0]).unwrap();
    assert_eq!(grade.score.value(), 5);
    assert_eq!(grade.criteria, service);
}

#[test]
fn grades_stay_between_one_and_five() {
    assert!(Score::new(0).is_err());
    assert!(Score::new(6).is_err());
    let db = setup();
    let err = db
        .execute(
            "insert into NOTES (numero, note, fk_comm, fk_crit) values (1, 9, 1, 1)",
            [],
        )
        .unwrap_err();
    assert!(err.to_string().contains("CHECK") || err.to_string().contains("constraint"));
}

#[test]
fn moving_a_vote_to_another_restaurant() {
    let db = setup();
    let mut session = Session::new(&db);
    let first = restaurant(&mut session);
    let city = session.get(first).unwrap().address.city;
    let restaurant_type = session.get(first).unwrap().restaurant_type;
    let address = Address {
        street: "Place Pury 3".into(),
        city,
    };
    let second = session
        .restaurants()
        .create(Restaurant::new("Chez Gino", None, None, address, restaurant_type))
        .unwrap();
    let like = vote(&mut session, first, true, date(5, 1));

    session.get_mut(like).unwrap().restaurant = second;
    session.basic_evaluations().save(like).unwrap();
    assert!(!session.get(first).unwrap().has_evaluations());
    assert_eq!(session.get(second).unwrap().evaluations(), &[Evaluation::Basic(like)]);
    assert_eq!(session.basic_evaluations().count_likes(second.id()).unwrap(), 1);
}

#[test]
fn padded_appreciation_codes_count_the_same_everywhere() {
    let db = setup();
    let mut session = Session::new(&db);
    let restaurant = restaurant(&mut session);
    let id = restaurant.id();
    db.execute(
        "insert into LIKES (numero, appreciation, date_eval, adresse_ip, fk_rest) values (900, ' T', '2024-05-02', '10.0.0.9', ?)",
        [id],
    )
    .unwrap();
    db.execute(
        "insert into LIKES (numero, appreciation, date_eval, adresse_ip, fk_rest) values (901, 'F ', '2024-05-03', '10.0.0.9', ?)",
        [id],
    )
    .unwrap();

    let likes = session.basic_evaluations().count_likes(id).unwrap();
    let dislikes = session.basic_evaluations().count_dislikes(id).unwrap();
    assert_eq!((likes, dislikes), (1, 1));
    let tally = session.basic_evaluations().tally(id).unwrap();
    assert_eq!((tally.likes, tally.dislikes), (likes, dislikes));
}

#[test]
fn moving_a_grade_to_another_review() {
    let db = setup();
    let mut session = Session::new(&db);
    let restaurant = restaurant(&mut session);
    let first = review(&mut session, restaurant, "alice", date(5, 1));
    let second = review(&mut session, restaurant, "bob", date(5, 2));
    let service = session
        .evaluation_criteria()
        .create(EvaluationCriteria::new("Service", None))
        .unwrap();
    let grade = session
        .grades()
        .create(Grade::new(Score::new(4).unwrap(), first, service))
        .unwrap();

    session.get_mut(grade).unwrap().evaluation = second;
    session.grades().save(grade).unwrap();
    assert_eq!(session.get(first).unwrap().grades().count(), 0);
    assert_eq!(session.get(second).unwrap().grades().collect::<Vec<_>>(), vec![grade]);

    session.clear();
    assert!(session.grades().find_by_evaluation_id(first.id()).unwrap().is_empty());
    assert_eq!(session.grades().find_by_evaluation_id(second.id()).unwrap(), vec![grade]);
}

#[test]
fn deleting_a_moved_vote_leaves_no_trace() {
    let db = setup();
    let mut session = Session::new(&db);
    let first = restaurant(&mut session);
    let like = vote(&mut session, first, true, date(5, 1));
    let city = session.get(first).unwrap().address.city;
    let restaurant_type = session.get(first).unwrap().restaurant_type;
    let address = Address {
        street: "Place Pury 3".into(),
        city,
    };
    let second = session
        .restaurants()
        .create(Restaurant::new("Chez Gino", None, None, address, restaurant_type))
        .unwrap();

    // edited in place but never written
    session.get_mut(like).unwrap().restaurant = second;
    assert!(session.basic_evaluations().delete_by_id(like.id()).unwrap());
    assert!(!session.get(first).unwrap().has_evaluations());
    assert!(!session.get(second).unwrap().has_evaluations());
}
