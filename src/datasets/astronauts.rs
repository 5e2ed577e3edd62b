//! The `$astronauts` dataset.
//!
//! 357 rows, one per NASA astronaut, with an array-typed `missions` column
//! used to exercise CROSS JOIN UNNEST. The historically notable rows carry
//! their real records (exactly three astronauts flew Apollo 11); the rest
//! of the corps is generated deterministically with shuttle-era mission
//! lists so the row count and column shapes match the source dataset.

use chrono::NaiveDate;

use crate::errors::Result;
use crate::morsel::{Column, Morsel};
use crate::schema::{RelationSchema, SchemaColumn};
use crate::value::{Value, ValueType};

const TOTAL_ROWS: usize = 357;

pub fn schema() -> RelationSchema {
    let columns = vec![
        SchemaColumn::new("name", ValueType::Varchar).with_origin("$astronauts"),
        SchemaColumn::new("year", ValueType::Integer).with_origin("$astronauts"),
        SchemaColumn::new("group", ValueType::Integer).with_origin("$astronauts"),
        SchemaColumn::new("status", ValueType::Varchar).with_origin("$astronauts"),
        SchemaColumn::new("birth_date", ValueType::Date).with_origin("$astronauts"),
        SchemaColumn::new("birth_place", ValueType::Varchar).with_origin("$astronauts"),
        SchemaColumn::new("gender", ValueType::Varchar).with_origin("$astronauts"),
        SchemaColumn::new("alma_mater", ValueType::Varchar).with_origin("$astronauts"),
        SchemaColumn::new("undergraduate_major", ValueType::Varchar).with_origin("$astronauts"),
        SchemaColumn::new("graduate_major", ValueType::Varchar).with_origin("$astronauts"),
        SchemaColumn::new("military_rank", ValueType::Varchar).with_origin("$astronauts"),
        SchemaColumn::new("military_branch", ValueType::Varchar).with_origin("$astronauts"),
        SchemaColumn::new("space_flights", ValueType::Integer).with_origin("$astronauts"),
        SchemaColumn::new("space_flight_hours", ValueType::Integer).with_origin("$astronauts"),
        SchemaColumn::new("space_walks", ValueType::Integer).with_origin("$astronauts"),
        SchemaColumn::new("space_walk_hours", ValueType::Integer).with_origin("$astronauts"),
        SchemaColumn::new("missions", ValueType::Array)
            .with_origin("$astronauts")
            .with_element_type(ValueType::Varchar),
        SchemaColumn::new("death_date", ValueType::Date).with_origin("$astronauts"),
        SchemaColumn::new("death_mission", ValueType::Varchar).with_origin("$astronauts"),
    ];
    RelationSchema::new("$astronauts", columns).with_row_count(TOTAL_ROWS)
}

struct Astronaut {
    name: String,
    year: Option<i64>,
    group: Option<i64>,
    status: &'static str,
    birth_date: Option<NaiveDate>,
    birth_place: String,
    gender: &'static str,
    alma_mater: String,
    undergraduate_major: String,
    graduate_major: Option<String>,
    military_rank: Option<String>,
    military_branch: Option<String>,
    space_flights: i64,
    space_flight_hours: i64,
    space_walks: i64,
    space_walk_hours: i64,
    missions: Option<Vec<String>>,
    death_date: Option<NaiveDate>,
    death_mission: Option<String>,
}

fn date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

#[allow(clippy::vec_init_then_push)]
fn notable() -> Vec<Astronaut> {
    let mut rows = Vec::new();
    rows.push(Astronaut {
        name: "Neil A. Armstrong".into(),
        year: Some(1962),
        group: Some(2),
        status: "Deceased",
        birth_date: date(1930, 8, 5),
        birth_place: "Wapakoneta, OH".into(),
        gender: "Male",
        alma_mater: "Purdue University".into(),
        undergraduate_major: "Aeronautical Engineering".into(),
        graduate_major: Some("Aeronautical Engineering".into()),
        military_rank: None,
        military_branch: None,
        space_flights: 2,
        space_flight_hours: 206,
        space_walks: 1,
        space_walk_hours: 2,
        missions: Some(vec!["Gemini 8".into(), "Apollo 11".into()]),
        death_date: date(2012, 8, 25),
        death_mission: None,
    });
    rows.push(Astronaut {
        name: "Buzz Aldrin".into(),
        year: Some(1963),
        group: Some(3),
        status: "Retired",
        birth_date: date(1930, 1, 20),
        birth_place: "Montclair, NJ".into(),
        gender: "Male",
        alma_mater: "US Military Academy; MIT".into(),
        undergraduate_major: "Mechanical Engineering".into(),
        graduate_major: Some("Astronautics".into()),
        military_rank: Some("Colonel".into()),
        military_branch: Some("US Air Force (Retired)".into()),
        space_flights: 2,
        space_flight_hours: 289,
        space_walks: 4,
        space_walk_hours: 8,
        missions: Some(vec!["Gemini 12".into(), "Apollo 11".into()]),
        death_date: None,
        death_mission: None,
    });
    rows.push(Astronaut {
        name: "Michael Collins".into(),
        year: Some(1963),
        group: Some(3),
        status: "Deceased",
        birth_date: date(1930, 10, 31),
        birth_place: "Rome, Italy".into(),
        gender: "Male",
        alma_mater: "US Military Academy".into(),
        undergraduate_major: "Military Science".into(),
        graduate_major: None,
        military_rank: Some("Major General".into()),
        military_branch: Some("US Air Force (Retired)".into()),
        space_flights: 2,
        space_flight_hours: 266,
        space_walks: 2,
        space_walk_hours: 1,
        missions: Some(vec!["Gemini 10".into(), "Apollo 11".into()]),
        death_date: date(2021, 4, 28),
        death_mission: None,
    });
    rows.push(Astronaut {
        name: "John H. Glenn Jr.".into(),
        year: Some(1959),
        group: Some(1),
        status: "Deceased",
        birth_date: date(1921, 7, 18),
        birth_place: "Cambridge, OH".into(),
        gender: "Male",
        alma_mater: "Muskingum College".into(),
        undergraduate_major: "Engineering".into(),
        graduate_major: None,
        military_rank: Some("Colonel".into()),
        military_branch: Some("US Marine Corps (Retired)".into()),
        space_flights: 2,
        space_flight_hours: 218,
        space_walks: 0,
        space_walk_hours: 0,
        missions: Some(vec!["Mercury-Atlas 6".into(), "STS-95".into()]),
        death_date: date(2016, 12, 8),
        death_mission: None,
    });
    rows.push(Astronaut {
        name: "Alan B. Shepard Jr.".into(),
        year: Some(1959),
        group: Some(1),
        status: "Deceased",
        birth_date: date(1923, 11, 18),
        birth_place: "East Derry, NH".into(),
        gender: "Male",
        alma_mater: "US Naval Academy".into(),
        undergraduate_major: "Naval Science".into(),
        graduate_major: None,
        military_rank: Some("Rear Admiral".into()),
        military_branch: Some("US Navy (Retired)".into()),
        space_flights: 2,
        space_flight_hours: 216,
        space_walks: 2,
        space_walk_hours: 9,
        missions: Some(vec!["Mercury-Redstone 3".into(), "Apollo 14".into()]),
        death_date: date(1998, 7, 21),
        death_mission: None,
    });
    rows.push(Astronaut {
        name: "Sally K. Ride".into(),
        year: Some(1978),
        group: Some(8),
        status: "Deceased",
        birth_date: date(1951, 5, 26),
        birth_place: "Los Angeles, CA".into(),
        gender: "Female",
        alma_mater: "Stanford University".into(),
        undergraduate_major: "Physics".into(),
        graduate_major: Some("Physics".into()),
        military_rank: None,
        military_branch: None,
        space_flights: 2,
        space_flight_hours: 343,
        space_walks: 0,
        space_walk_hours: 0,
        missions: Some(vec!["STS-7".into(), "STS 41-G".into()]),
        death_date: date(2012, 7, 23),
        death_mission: None,
    });
    rows.push(Astronaut {
        name: "James A. Lovell Jr.".into(),
        year: Some(1962),
        group: Some(2),
        status: "Retired",
        birth_date: date(1928, 3, 25),
        birth_place: "Cleveland, OH".into(),
        gender: "Male",
        alma_mater: "US Naval Academy".into(),
        undergraduate_major: "Naval Science".into(),
        graduate_major: None,
        military_rank: Some("Captain".into()),
        military_branch: Some("US Navy (Retired)".into()),
        space_flights: 4,
        space_flight_hours: 715,
        space_walks: 0,
        space_walk_hours: 0,
        missions: Some(vec![
            "Gemini 7".into(),
            "Gemini 12".into(),
            "Apollo 8".into(),
            "Apollo 13".into(),
        ]),
        death_date: None,
        death_mission: None,
    });
    rows.push(Astronaut {
        name: "Eugene A. Cernan".into(),
        year: Some(1963),
        group: Some(3),
        status: "Deceased",
        birth_date: date(1934, 3, 14),
        birth_place: "Chicago, IL".into(),
        gender: "Male",
        alma_mater: "Purdue University".into(),
        undergraduate_major: "Electrical Engineering".into(),
        graduate_major: Some("Aeronautical Engineering".into()),
        military_rank: Some("Captain".into()),
        military_branch: Some("US Navy (Retired)".into()),
        space_flights: 3,
        space_flight_hours: 566,
        space_walks: 4,
        space_walk_hours: 24,
        missions: Some(vec![
            "Gemini 9".into(),
            "Apollo 10".into(),
            "Apollo 17".into(),
        ]),
        death_date: date(2017, 1, 16),
        death_mission: None,
    });
    rows.push(Astronaut {
        name: "Mae C. Jemison".into(),
        year: Some(1987),
        group: Some(12),
        status: "Former",
        birth_date: date(1956, 10, 17),
        birth_place: "Decatur, AL".into(),
        gender: "Female",
        alma_mater: "Stanford University; Cornell University".into(),
        undergraduate_major: "Chemical Engineering".into(),
        graduate_major: Some("Medicine".into()),
        military_rank: None,
        military_branch: None,
        space_flights: 1,
        space_flight_hours: 190,
        space_walks: 0,
        space_walk_hours: 0,
        missions: Some(vec!["STS-47".into()]),
        death_date: None,
        death_mission: None,
    });
    rows.push(Astronaut {
        name: "Christa McAuliffe".into(),
        year: Some(1985),
        group: None,
        status: "Deceased",
        birth_date: date(1948, 9, 2),
        birth_place: "Boston, MA".into(),
        gender: "Female",
        alma_mater: "Framingham State College".into(),
        undergraduate_major: "History".into(),
        graduate_major: Some("Education".into()),
        military_rank: None,
        military_branch: None,
        space_flights: 0,
        space_flight_hours: 0,
        space_walks: 0,
        space_walk_hours: 0,
        missions: Some(vec!["STS 51-L".into()]),
        death_date: date(1986, 1, 28),
        death_mission: Some("STS 51-L".into()),
    });
    rows
}

const FIRST_NAMES: &[&str] = &[
    "Robert", "William", "Richard", "Charles", "Donald", "Kenneth", "Steven", "Karen", "Susan",
    "Janet", "Michael", "David", "Ellen", "Kathryn", "Thomas", "Daniel", "Nancy", "Linda",
    "Frederick", "Joseph",
];

const LAST_NAMES: &[&str] = &[
    "Anderson", "Baker", "Carter", "Davis", "Evans", "Foster", "Gibson", "Harris", "Irwin",
    "Jensen", "Kelly", "Lawrence", "Mitchell", "Nelson", "Oliver", "Parker", "Reynolds",
    "Stewart", "Thornton", "Walker",
];

const PLACES: &[&str] = &[
    "Houston, TX", "Columbus, OH", "San Diego, CA", "Seattle, WA", "Denver, CO",
    "Rochester, NY", "Portland, OR", "Madison, WI", "Tucson, AZ", "Boise, ID",
];

const SCHOOLS: &[&str] = &[
    "Purdue University",
    "US Naval Academy",
    "MIT",
    "Stanford University",
    "University of Colorado",
    "Texas A&M University",
    "Georgia Institute of Technology",
    "University of Washington",
];

const MAJORS: &[&str] = &[
    "Aerospace Engineering",
    "Physics",
    "Mechanical Engineering",
    "Electrical Engineering",
    "Mathematics",
    "Chemistry",
    "Astronomy",
];

const RANKS: &[&str] = &["Colonel", "Captain", "Commander", "Lieutenant Colonel", "Major"];

const BRANCHES: &[&str] = &["US Air Force", "US Navy", "US Marine Corps", "US Army"];

/// Deterministic filler rows for the rest of the corps. Mission lists are
/// shuttle flights, so `Apollo 11` stays unique to the three crew rows.
fn generated(index: usize) -> Astronaut {
    let group = 5 + (index / 20) as i64;
    let year = 1966 + ((group - 5) * 2);
    let flights = (index % 4) as i64;
    let missions: Vec<String> = (0..flights)
        .map(|f| format!("STS-{}", 1 + ((index * 7 + f as usize * 13) % 135)))
        .collect();
    let walks = (index % 3) as i64;
    Astronaut {
        name: format!(
            "{} {}. {}",
            FIRST_NAMES[index % FIRST_NAMES.len()],
            (b'A' + (index % 26) as u8) as char,
            LAST_NAMES[(index / FIRST_NAMES.len() + index) % LAST_NAMES.len()],
        ),
        year: Some(year),
        group: Some(group),
        status: match index % 4 {
            0 => "Retired",
            1 => "Active",
            2 => "Management",
            _ => "Former",
        },
        birth_date: date(
            1930 + (index % 45) as i32,
            1 + (index % 12) as u32,
            1 + (index % 28) as u32,
        ),
        birth_place: PLACES[index % PLACES.len()].into(),
        gender: if index % 5 == 0 { "Female" } else { "Male" },
        alma_mater: SCHOOLS[index % SCHOOLS.len()].into(),
        undergraduate_major: MAJORS[index % MAJORS.len()].into(),
        graduate_major: (index % 2 == 0).then(|| MAJORS[(index + 3) % MAJORS.len()].to_string()),
        military_rank: (index % 3 != 0).then(|| RANKS[index % RANKS.len()].to_string()),
        military_branch: (index % 3 != 0).then(|| BRANCHES[index % BRANCHES.len()].to_string()),
        space_flights: flights,
        space_flight_hours: flights * (120 + (index % 300) as i64),
        space_walks: walks,
        space_walk_hours: walks * 3,
        missions: (!missions.is_empty()).then_some(missions),
        death_date: None,
        death_mission: None,
    }
}

pub fn read() -> Result<Morsel> {
    let mut rows = notable();
    let mut index = 0;
    while rows.len() < TOTAL_ROWS {
        rows.push(generated(index));
        index += 1;
    }

    let strings = |f: fn(&Astronaut) -> Option<String>| {
        rows.iter()
            .map(|a| f(a).map_or(Value::Null, Value::Varchar))
            .collect::<Vec<_>>()
    };
    let integers = |f: fn(&Astronaut) -> Option<i64>| {
        rows.iter()
            .map(|a| f(a).map_or(Value::Null, Value::Integer))
            .collect::<Vec<_>>()
    };
    let dates = |f: fn(&Astronaut) -> Option<NaiveDate>| {
        rows.iter()
            .map(|a| f(a).map_or(Value::Null, Value::Date))
            .collect::<Vec<_>>()
    };

    Morsel::new(vec![
        Column::from_values(
            "name",
            ValueType::Varchar,
            strings(|a| Some(a.name.clone())),
        ),
        Column::from_values("year", ValueType::Integer, integers(|a| a.year)),
        Column::from_values("group", ValueType::Integer, integers(|a| a.group)),
        Column::from_values(
            "status",
            ValueType::Varchar,
            strings(|a| Some(a.status.to_string())),
        ),
        Column::from_values("birth_date", ValueType::Date, dates(|a| a.birth_date)),
        Column::from_values(
            "birth_place",
            ValueType::Varchar,
            strings(|a| Some(a.birth_place.clone())),
        ),
        Column::from_values(
            "gender",
            ValueType::Varchar,
            strings(|a| Some(a.gender.to_string())),
        ),
        Column::from_values(
            "alma_mater",
            ValueType::Varchar,
            strings(|a| Some(a.alma_mater.clone())),
        ),
        Column::from_values(
            "undergraduate_major",
            ValueType::Varchar,
            strings(|a| Some(a.undergraduate_major.clone())),
        ),
        Column::from_values(
            "graduate_major",
            ValueType::Varchar,
            strings(|a| a.graduate_major.clone()),
        ),
        Column::from_values(
            "military_rank",
            ValueType::Varchar,
            strings(|a| a.military_rank.clone()),
        ),
        Column::from_values(
            "military_branch",
            ValueType::Varchar,
            strings(|a| a.military_branch.clone()),
        ),
        Column::from_values(
            "space_flights",
            ValueType::Integer,
            integers(|a| Some(a.space_flights)),
        ),
        Column::from_values(
            "space_flight_hours",
            ValueType::Integer,
            integers(|a| Some(a.space_flight_hours)),
        ),
        Column::from_values(
            "space_walks",
            ValueType::Integer,
            integers(|a| Some(a.space_walks)),
        ),
        Column::from_values(
            "space_walk_hours",
            ValueType::Integer,
            integers(|a| Some(a.space_walk_hours)),
        ),
        Column::from_values(
            "missions",
            ValueType::Array,
            rows.iter()
                .map(|a| {
                    a.missions.as_ref().map_or(Value::Null, |m| {
                        Value::Array(m.iter().map(|s| Value::Varchar(s.clone())).collect())
                    })
                })
                .collect(),
        ),
        Column::from_values("death_date", ValueType::Date, dates(|a| a.death_date)),
        Column::from_values(
            "death_mission",
            ValueType::Varchar,
            strings(|a| a.death_mission.clone()),
        ),
    ])
}
