use std::io::{self, BufRead, Write};

use guideresto::config::{init_tracing, Settings};
use guideresto::datatype::Id;
use guideresto::entity::{Handle, Restaurant};
use guideresto::error::Result;
use guideresto::persist;
use guideresto::service::GuideService;
use tracing::error;

fn describe(guide: &GuideService<'_>, restaurant: Handle<Restaurant>) -> String {
    let session = guide.session();
    match session.get(restaurant) {
        Some(r) => {
            let city = session
                .get(r.address.city)
                .map(|c| c.to_string())
                .unwrap_or_default();
            let label = session
                .get(r.restaurant_type)
                .map(|t| t.label.as_str())
                .unwrap_or_default();
            format!("{:>4}  {} ({label}), {}, {city}", restaurant.id(), r.name, r.address.street)
        }
        None => format!("{restaurant}"),
    }
}

fn list(guide: &GuideService<'_>, restaurants: &[Handle<Restaurant>]) {
    if restaurants.is_empty() {
        println!("   nothing found");
    }
    for &restaurant in restaurants {
        println!("{}", describe(guide, restaurant));
    }
}

fn show(guide: &mut GuideService<'_>, id: Id) -> Result<()> {
    let likes = guide.likes_of(id)?;
    let dislikes = guide.dislikes_of(id)?;
    let reviews = guide.complete_evaluations_of(id)?;
    println!("   {likes} like(s), {dislikes} dislike(s)");
    for review in reviews {
        if let Some(e) = guide.session().get(review) {
            println!("   {} {}: {}", e.visit_date, e.username, e.comment);
        }
    }
    Ok(())
}

fn run(guide: &mut GuideService<'_>, verb: &str, argument: &str) -> Result<bool> {
    let id = || argument.parse::<Id>().ok();
    match (verb, id()) {
        ("quit", _) | ("q", _) => return Ok(false),
        ("list", _) => {
            let restaurants = guide.restaurants()?;
            list(guide, &restaurants);
        }
        ("search", _) => {
            let restaurants = guide.restaurants_by_name_like(argument)?;
            list(guide, &restaurants);
        }
        ("city", _) => {
            let restaurants = guide.restaurants_by_city_name(argument)?;
            list(guide, &restaurants);
        }
        ("show", Some(id)) => show(guide, id)?,
        ("like", Some(id)) | ("dislike", Some(id)) => {
            match guide.restaurant(id)? {
                Some(r) if verb == "like" => {
                    guide.like_restaurant(r, "127.0.0.1")?;
                }
                Some(r) => {
                    guide.dislike_restaurant(r, "127.0.0.1")?;
                }
                None => println!("   no restaurant {id}"),
            }
        }
        ("delete", Some(id)) => {
            let report = guide.delete_restaurant(id)?;
            println!("   {} row(s) removed", report.total());
        }
        _ => println!("   list | search <name> | city <name> | show <n> | like <n> | dislike <n> | delete <n> | quit"),
    }
    Ok(true)
}

fn main() {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return;
        }
    };
    if let Err(e) = init_tracing(&settings.logging) {
        eprintln!("{e}");
    }
    let db = match persist::open(&settings.database) {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "could not open the store");
            return;
        }
    };
    let mut guide = GuideService::new(&db);

    let stdin = io::stdin();
    loop {
        print!("guide> ");
        let _ = io::stdout().flush();
        let mut entered = String::new();
        match stdin.lock().read_line(&mut entered) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let entered = entered.trim();
        let (verb, argument) = entered.split_once(' ').unwrap_or((entered, ""));
        match run(&mut guide, verb, argument.trim()) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("   {e}"),
        }
    }
}
