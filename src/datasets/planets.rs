//! The `$planets` dataset.
//!
//! Nine rows from the NASA planetary fact sheet. This dataset is embedded
//! so tests and examples always have a small relation with known content;
//! `$satellites.planetId` joins to `id` here.

use crate::errors::Result;
use crate::morsel::{Column, Morsel};
use crate::schema::{RelationSchema, SchemaColumn};
use crate::value::{Value, ValueType};

pub fn schema() -> RelationSchema {
    let columns = vec![
        SchemaColumn::new("id", ValueType::Integer)
            .with_origin("$planets")
            .with_range(Value::Integer(1), Value::Integer(9)),
        SchemaColumn::new("name", ValueType::Varchar).with_origin("$planets"),
        SchemaColumn::new("mass", ValueType::Double).with_origin("$planets"),
        SchemaColumn::new("diameter", ValueType::Integer).with_origin("$planets"),
        SchemaColumn::new("density", ValueType::Integer).with_origin("$planets"),
        SchemaColumn::new("gravity", ValueType::Double).with_origin("$planets"),
        SchemaColumn::new("escapeVelocity", ValueType::Double)
            .with_origin("$planets")
            .with_aliases(vec!["escape_velocity".to_string()]),
        SchemaColumn::new("rotationPeriod", ValueType::Double)
            .with_origin("$planets")
            .with_aliases(vec!["rotation_period".to_string()]),
        SchemaColumn::new("lengthOfDay", ValueType::Double)
            .with_origin("$planets")
            .with_aliases(vec!["length_of_day".to_string()]),
        SchemaColumn::new("distanceFromSun", ValueType::Double)
            .with_origin("$planets")
            .with_aliases(vec!["distance_from_sun".to_string()]),
        SchemaColumn::new("perihelion", ValueType::Double).with_origin("$planets"),
        SchemaColumn::new("aphelion", ValueType::Double).with_origin("$planets"),
        SchemaColumn::new("orbitalPeriod", ValueType::Double)
            .with_origin("$planets")
            .with_aliases(vec!["orbital_period".to_string()]),
        SchemaColumn::new("orbitalVelocity", ValueType::Double)
            .with_origin("$planets")
            .with_aliases(vec!["orbital_velocity".to_string()]),
        SchemaColumn::new("orbitalInclination", ValueType::Double)
            .with_origin("$planets")
            .with_aliases(vec!["orbital_inclination".to_string()]),
        SchemaColumn::new("orbitalEccentricity", ValueType::Double)
            .with_origin("$planets")
            .with_aliases(vec!["orbital_eccentricity".to_string()]),
        SchemaColumn::new("obliquityToOrbit", ValueType::Double)
            .with_origin("$planets")
            .with_aliases(vec!["obliquity_to_orbit".to_string()]),
        SchemaColumn::new("meanTemperature", ValueType::Integer)
            .with_origin("$planets")
            .with_aliases(vec!["mean_temperature".to_string()]),
        SchemaColumn::new("surfacePressure", ValueType::Double)
            .with_origin("$planets")
            .with_aliases(vec!["surface_pressure".to_string()]),
        SchemaColumn::new("numberOfMoons", ValueType::Integer)
            .with_origin("$planets")
            .with_aliases(vec!["number_of_moons".to_string()]),
    ];
    RelationSchema::new("$planets", columns).with_row_count(9)
}

struct PlanetRow {
    id: i64,
    name: &'static str,
    mass: f64,
    diameter: i64,
    density: i64,
    gravity: f64,
    escape_velocity: f64,
    rotation_period: f64,
    length_of_day: f64,
    distance_from_sun: f64,
    perihelion: f64,
    aphelion: f64,
    orbital_period: f64,
    orbital_velocity: f64,
    orbital_inclination: f64,
    orbital_eccentricity: f64,
    obliquity_to_orbit: f64,
    mean_temperature: i64,
    surface_pressure: Option<f64>,
    number_of_moons: i64,
}

#[rustfmt::skip]
const PLANETS: [PlanetRow; 9] = [
    PlanetRow { id: 1, name: "Mercury", mass: 0.33,   diameter: 4879,   density: 5427, gravity: 3.7,  escape_velocity: 4.3,  rotation_period: 1407.6,  length_of_day: 4222.6, distance_from_sun: 57.9,   perihelion: 46.0,   aphelion: 69.8,   orbital_period: 88.0,    orbital_velocity: 47.4, orbital_inclination: 7.0,  orbital_eccentricity: 0.205, obliquity_to_orbit: 0.034, mean_temperature: 167,  surface_pressure: Some(0.0),     number_of_moons: 0 },
    PlanetRow { id: 2, name: "Venus",   mass: 4.87,   diameter: 12104,  density: 5243, gravity: 8.9,  escape_velocity: 10.4, rotation_period: -5832.5, length_of_day: 2802.0, distance_from_sun: 108.2,  perihelion: 107.5,  aphelion: 108.9,  orbital_period: 224.7,   orbital_velocity: 35.0, orbital_inclination: 3.4,  orbital_eccentricity: 0.007, obliquity_to_orbit: 177.4, mean_temperature: 464,  surface_pressure: Some(92.0),    number_of_moons: 0 },
    PlanetRow { id: 3, name: "Earth",   mass: 5.97,   diameter: 12756,  density: 5514, gravity: 9.8,  escape_velocity: 11.2, rotation_period: 23.9,    length_of_day: 24.0,   distance_from_sun: 149.6,  perihelion: 147.1,  aphelion: 152.1,  orbital_period: 365.2,   orbital_velocity: 29.8, orbital_inclination: 0.0,  orbital_eccentricity: 0.017, obliquity_to_orbit: 23.4,  mean_temperature: 15,   surface_pressure: Some(1.0),     number_of_moons: 1 },
    PlanetRow { id: 4, name: "Mars",    mass: 0.642,  diameter: 6792,   density: 3933, gravity: 3.7,  escape_velocity: 5.0,  rotation_period: 24.6,    length_of_day: 24.7,   distance_from_sun: 227.9,  perihelion: 206.6,  aphelion: 249.2,  orbital_period: 687.0,   orbital_velocity: 24.1, orbital_inclination: 1.9,  orbital_eccentricity: 0.094, obliquity_to_orbit: 25.2,  mean_temperature: -65,  surface_pressure: Some(0.01),    number_of_moons: 2 },
    PlanetRow { id: 5, name: "Jupiter", mass: 1898.0, diameter: 142984, density: 1326, gravity: 23.1, escape_velocity: 59.5, rotation_period: 9.9,     length_of_day: 9.9,    distance_from_sun: 778.6,  perihelion: 740.5,  aphelion: 816.6,  orbital_period: 4331.0,  orbital_velocity: 13.1, orbital_inclination: 1.3,  orbital_eccentricity: 0.049, obliquity_to_orbit: 3.1,   mean_temperature: -110, surface_pressure: None,          number_of_moons: 79 },
    PlanetRow { id: 6, name: "Saturn",  mass: 568.0,  diameter: 120536, density: 687,  gravity: 9.0,  escape_velocity: 35.5, rotation_period: 10.7,    length_of_day: 10.7,   distance_from_sun: 1433.5, perihelion: 1352.6, aphelion: 1514.5, orbital_period: 10747.0, orbital_velocity: 9.7,  orbital_inclination: 2.5,  orbital_eccentricity: 0.057, obliquity_to_orbit: 26.7,  mean_temperature: -140, surface_pressure: None,          number_of_moons: 62 },
    PlanetRow { id: 7, name: "Uranus",  mass: 86.8,   diameter: 51118,  density: 1271, gravity: 8.7,  escape_velocity: 21.3, rotation_period: -17.2,   length_of_day: 17.2,   distance_from_sun: 2872.5, perihelion: 2741.3, aphelion: 3003.6, orbital_period: 30589.0, orbital_velocity: 6.8,  orbital_inclination: 0.8,  orbital_eccentricity: 0.046, obliquity_to_orbit: 97.8,  mean_temperature: -195, surface_pressure: None,          number_of_moons: 27 },
    PlanetRow { id: 8, name: "Neptune", mass: 102.0,  diameter: 49528,  density: 1638, gravity: 11.0, escape_velocity: 23.5, rotation_period: 16.1,    length_of_day: 16.1,   distance_from_sun: 4495.1, perihelion: 4444.5, aphelion: 4545.7, orbital_period: 59800.0, orbital_velocity: 5.4,  orbital_inclination: 1.8,  orbital_eccentricity: 0.011, obliquity_to_orbit: 28.3,  mean_temperature: -200, surface_pressure: None,          number_of_moons: 14 },
    PlanetRow { id: 9, name: "Pluto",   mass: 0.0146, diameter: 2370,   density: 2095, gravity: 0.7,  escape_velocity: 1.3,  rotation_period: -153.3,  length_of_day: 153.3,  distance_from_sun: 5906.4, perihelion: 4436.8, aphelion: 7375.9, orbital_period: 90560.0, orbital_velocity: 4.7,  orbital_inclination: 17.2, orbital_eccentricity: 0.244, obliquity_to_orbit: 122.5, mean_temperature: -225, surface_pressure: Some(0.00001), number_of_moons: 5 },
];

pub fn read() -> Result<Morsel> {
    let ints = |f: fn(&PlanetRow) -> i64| PLANETS.iter().map(f).map(Value::Integer).collect();
    let doubles = |f: fn(&PlanetRow) -> f64| PLANETS.iter().map(f).map(Value::Double).collect();

    Morsel::new(vec![
        Column::from_values("id", ValueType::Integer, ints(|p| p.id)),
        Column::from_values(
            "name",
            ValueType::Varchar,
            PLANETS
                .iter()
                .map(|p| Value::Varchar(p.name.to_string()))
                .collect(),
        ),
        Column::from_values("mass", ValueType::Double, doubles(|p| p.mass)),
        Column::from_values("diameter", ValueType::Integer, ints(|p| p.diameter)),
        Column::from_values("density", ValueType::Integer, ints(|p| p.density)),
        Column::from_values("gravity", ValueType::Double, doubles(|p| p.gravity)),
        Column::from_values(
            "escapeVelocity",
            ValueType::Double,
            doubles(|p| p.escape_velocity),
        ),
        Column::from_values(
            "rotationPeriod",
            ValueType::Double,
            doubles(|p| p.rotation_period),
        ),
        Column::from_values(
            "lengthOfDay",
            ValueType::Double,
            doubles(|p| p.length_of_day),
        ),
        Column::from_values(
            "distanceFromSun",
            ValueType::Double,
            doubles(|p| p.distance_from_sun),
        ),
        Column::from_values("perihelion", ValueType::Double, doubles(|p| p.perihelion)),
        Column::from_values("aphelion", ValueType::Double, doubles(|p| p.aphelion)),
        Column::from_values(
            "orbitalPeriod",
            ValueType::Double,
            doubles(|p| p.orbital_period),
        ),
        Column::from_values(
            "orbitalVelocity",
            ValueType::Double,
            doubles(|p| p.orbital_velocity),
        ),
        Column::from_values(
            "orbitalInclination",
            ValueType::Double,
            doubles(|p| p.orbital_inclination),
        ),
        Column::from_values(
            "orbitalEccentricity",
            ValueType::Double,
            doubles(|p| p.orbital_eccentricity),
        ),
        Column::from_values(
            "obliquityToOrbit",
            ValueType::Double,
            doubles(|p| p.obliquity_to_orbit),
        ),
        Column::from_values(
            "meanTemperature",
            ValueType::Integer,
            ints(|p| p.mean_temperature),
        ),
        Column::from_values(
            "surfacePressure",
            ValueType::Double,
            PLANETS
                .iter()
                .map(|p| p.surface_pressure.map_or(Value::Null, Value::Double))
                .collect(),
        ),
        Column::from_values(
            "numberOfMoons",
            ValueType::Integer,
            ints(|p| p.number_of_moons),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_row_is_mercury() {
        let morsel = read().expect("planets read");
        assert_eq!(morsel.shape(), (9, 20));
        assert_eq!(
            morsel.column_by_name("name").expect("name column").values[0],
            Value::Varchar("Mercury".into())
        );
    }

    #[test]
    fn gas_giants_have_no_surface_pressure() {
        let morsel = read().expect("planets read");
        let pressure = morsel
            .column_by_name("surfacePressure")
            .expect("surfacePressure column");
        assert!(pressure.values[4].is_null()); // Jupiter
        assert!(!pressure.values[2].is_null()); // Earth
    }
}
