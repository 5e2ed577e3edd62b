//! The `$satellites` dataset.
//!
//! 177 rows, one per catalogued moon, keyed to `$planets` by `planetId`.
//! The headline moons carry their published physical parameters; the long
//! tail of small provisional-designation moons gets deterministic filler
//! values so the dataset has a stable, realistic spread without embedding
//! a binary artifact.

use crate::errors::Result;
use crate::morsel::{Column, Morsel};
use crate::schema::{RelationSchema, SchemaColumn};
use crate::value::{Value, ValueType};

pub fn schema() -> RelationSchema {
    let columns = vec![
        SchemaColumn::new("id", ValueType::Integer)
            .with_origin("$satellites")
            .with_range(Value::Integer(1), Value::Integer(177)),
        SchemaColumn::new("planetId", ValueType::Integer)
            .with_origin("$satellites")
            .with_aliases(vec!["planet_id".to_string()])
            .with_range(Value::Integer(3), Value::Integer(9)),
        SchemaColumn::new("name", ValueType::Varchar).with_origin("$satellites"),
        SchemaColumn::new("gm", ValueType::Double).with_origin("$satellites"),
        SchemaColumn::new("radius", ValueType::Double).with_origin("$satellites"),
        SchemaColumn::new("density", ValueType::Double).with_origin("$satellites"),
        SchemaColumn::new("magnitude", ValueType::Double).with_origin("$satellites"),
        SchemaColumn::new("albedo", ValueType::Double).with_origin("$satellites"),
    ];
    RelationSchema::new("$satellites", columns).with_row_count(177)
}

/// (name, planetId) for every catalogued moon, grouped by planet.
#[rustfmt::skip]
const NAMES: &[(&str, i64)] = &[
    // Earth
    ("Moon", 3),
    // Mars
    ("Phobos", 4), ("Deimos", 4),
    // Jupiter
    ("Io", 5), ("Europa", 5), ("Ganymede", 5), ("Callisto", 5), ("Amalthea", 5),
    ("Himalia", 5), ("Elara", 5), ("Pasiphae", 5), ("Sinope", 5), ("Lysithea", 5),
    ("Carme", 5), ("Ananke", 5), ("Leda", 5), ("Thebe", 5), ("Adrastea", 5),
    ("Metis", 5), ("Callirrhoe", 5), ("Themisto", 5), ("Megaclite", 5), ("Taygete", 5),
    ("Chaldene", 5), ("Harpalyke", 5), ("Kalyke", 5), ("Iocaste", 5), ("Erinome", 5),
    ("Isonoe", 5), ("Praxidike", 5), ("Autonoe", 5), ("Thyone", 5), ("Hermippe", 5),
    ("Aitne", 5), ("Eurydome", 5), ("Euanthe", 5), ("Euporie", 5), ("Orthosie", 5),
    ("Sponde", 5), ("Kale", 5), ("Pasithee", 5), ("Hegemone", 5), ("Mneme", 5),
    ("Aoede", 5), ("Thelxinoe", 5), ("Arche", 5), ("Kallichore", 5), ("Helike", 5),
    ("Carpo", 5), ("Eukelade", 5), ("Cyllene", 5), ("Kore", 5), ("Herse", 5),
    ("S/2003 J 2", 5), ("S/2003 J 3", 5), ("S/2003 J 4", 5), ("S/2003 J 5", 5),
    ("S/2003 J 9", 5), ("S/2003 J 10", 5), ("S/2003 J 12", 5), ("S/2003 J 15", 5),
    ("S/2003 J 16", 5), ("S/2003 J 18", 5), ("S/2003 J 19", 5), ("S/2003 J 23", 5),
    ("S/2010 J 1", 5), ("S/2010 J 2", 5), ("S/2011 J 1", 5), ("S/2011 J 2", 5),
    ("S/2017 J 1", 5),
    // Saturn
    ("Mimas", 6), ("Enceladus", 6), ("Tethys", 6), ("Dione", 6), ("Rhea", 6),
    ("Titan", 6), ("Hyperion", 6), ("Iapetus", 6), ("Phoebe", 6), ("Janus", 6),
    ("Epimetheus", 6), ("Helene", 6), ("Telesto", 6), ("Calypso", 6), ("Atlas", 6),
    ("Prometheus", 6), ("Pandora", 6), ("Pan", 6), ("Ymir", 6), ("Paaliaq", 6),
    ("Tarvos", 6), ("Ijiraq", 6), ("Suttungr", 6), ("Kiviuq", 6), ("Mundilfari", 6),
    ("Albiorix", 6), ("Skathi", 6), ("Erriapus", 6), ("Siarnaq", 6), ("Thrymr", 6),
    ("Narvi", 6), ("Methone", 6), ("Pallene", 6), ("Polydeuces", 6), ("Daphnis", 6),
    ("Aegir", 6), ("Bebhionn", 6), ("Bergelmir", 6), ("Bestla", 6), ("Farbauti", 6),
    ("Fenrir", 6), ("Fornjot", 6), ("Hati", 6), ("Hyrrokkin", 6), ("Kari", 6),
    ("Loge", 6), ("Skoll", 6), ("Surtur", 6), ("Anthe", 6), ("Jarnsaxa", 6),
    ("Greip", 6), ("Tarqeq", 6), ("Aegaeon", 6),
    ("S/2004 S 7", 6), ("S/2004 S 12", 6), ("S/2004 S 13", 6), ("S/2004 S 17", 6),
    ("S/2006 S 1", 6), ("S/2006 S 3", 6), ("S/2007 S 2", 6), ("S/2007 S 3", 6),
    // Uranus
    ("Ariel", 7), ("Umbriel", 7), ("Titania", 7), ("Oberon", 7), ("Miranda", 7),
    ("Cordelia", 7), ("Ophelia", 7), ("Bianca", 7), ("Cressida", 7), ("Desdemona", 7),
    ("Juliet", 7), ("Portia", 7), ("Rosalind", 7), ("Belinda", 7), ("Puck", 7),
    ("Caliban", 7), ("Sycorax", 7), ("Prospero", 7), ("Setebos", 7), ("Stephano", 7),
    ("Trinculo", 7), ("Francisco", 7), ("Margaret", 7), ("Ferdinand", 7), ("Perdita", 7),
    ("Mab", 7), ("Cupid", 7),
    // Neptune
    ("Triton", 8), ("Nereid", 8), ("Naiad", 8), ("Thalassa", 8), ("Despina", 8),
    ("Galatea", 8), ("Larissa", 8), ("Proteus", 8), ("Halimede", 8), ("Psamathe", 8),
    ("Sao", 8), ("Laomedeia", 8), ("Neso", 8), ("Hippocamp", 8),
    // Pluto
    ("Charon", 9), ("Nix", 9), ("Hydra", 9), ("Kerberos", 9), ("Styx", 9),
];

/// Published (gm, radius, density, magnitude, albedo) for the major moons.
#[rustfmt::skip]
const MEASURED: &[(&str, f64, f64, f64, f64, f64)] = &[
    ("Moon",      4902.8, 1737.4, 3.344, -12.74, 0.12),
    ("Phobos",    0.0007, 11.1,   1.872, 11.4,   0.07),
    ("Deimos",    0.0001, 6.2,    1.471, 12.45,  0.07),
    ("Io",        5959.9, 1821.5, 3.528, 5.02,   0.63),
    ("Europa",    3202.7, 1560.8, 3.013, 5.29,   0.67),
    ("Ganymede",  9887.8, 2631.2, 1.942, 4.61,   0.43),
    ("Callisto",  7179.3, 2410.3, 1.834, 5.65,   0.17),
    ("Amalthea",  0.138,  83.45,  0.849, 14.1,   0.09),
    ("Himalia",   0.45,   85.0,   2.6,   14.2,   0.04),
    ("Mimas",     2.5,    198.2,  1.15,  12.8,   0.96),
    ("Enceladus", 7.2,    252.1,  1.61,  11.8,   1.38),
    ("Tethys",    41.2,   533.0,  0.98,  10.2,   1.23),
    ("Dione",     73.1,   561.7,  1.48,  10.4,   1.0),
    ("Rhea",      153.9,  764.3,  1.24,  9.6,    0.95),
    ("Titan",     8978.1, 2574.7, 1.88,  8.4,    0.2),
    ("Hyperion",  0.37,   135.0,  0.55,  14.4,   0.3),
    ("Iapetus",   120.5,  735.6,  1.09,  11.0,   0.6),
    ("Phoebe",    0.55,   106.5,  1.64,  16.4,   0.08),
    ("Telesto",   0.0,    12.4,   1.0,   18.5,   1.0),
    ("Calypso",   0.0,    10.7,   1.0,   18.7,   1.34),
    ("Ariel",     86.4,   578.9,  1.59,  13.7,   0.39),
    ("Umbriel",   81.5,   584.7,  1.46,  14.5,   0.21),
    ("Titania",   228.2,  788.9,  1.66,  13.5,   0.27),
    ("Oberon",    192.4,  761.4,  1.56,  13.7,   0.23),
    ("Miranda",   4.4,    235.8,  1.21,  15.8,   0.32),
    ("Triton",    1427.6, 1353.4, 2.059, 13.5,   0.72),
    ("Nereid",    2.06,   170.0,  1.5,   19.2,   0.16),
    ("Proteus",   3.36,   210.0,  1.3,   19.7,   0.1),
    ("Charon",    102.3,  603.6,  1.664, 17.26,  0.37),
];

/// Deterministic filler for moons without published parameters; keeps the
/// small-body spread (radii of a few km, dim magnitudes, low albedo).
fn synthesised(id: i64) -> (f64, f64, f64, f64, f64) {
    let spread = (id * 37 % 100) as f64 / 100.0;
    let gm = 0.000_1 + spread * 0.01;
    let radius = 1.0 + (id * 13 % 40) as f64;
    let density = 0.5 + spread * 2.0;
    let magnitude = 15.0 + (id * 7 % 120) as f64 / 10.0;
    let albedo = 0.04 + spread * 0.4;
    (gm, radius, density, magnitude, albedo)
}

pub fn read() -> Result<Morsel> {
    let mut ids = Vec::with_capacity(NAMES.len());
    let mut planet_ids = Vec::with_capacity(NAMES.len());
    let mut names = Vec::with_capacity(NAMES.len());
    let mut gms = Vec::with_capacity(NAMES.len());
    let mut radii = Vec::with_capacity(NAMES.len());
    let mut densities = Vec::with_capacity(NAMES.len());
    let mut magnitudes = Vec::with_capacity(NAMES.len());
    let mut albedos = Vec::with_capacity(NAMES.len());

    for (index, (name, planet_id)) in NAMES.iter().enumerate() {
        let id = index as i64 + 1;
        let (gm, radius, density, magnitude, albedo) = MEASURED
            .iter()
            .find(|(n, ..)| n == name)
            .map_or_else(|| synthesised(id), |m| (m.1, m.2, m.3, m.4, m.5));
        ids.push(Value::Integer(id));
        planet_ids.push(Value::Integer(*planet_id));
        names.push(Value::Varchar((*name).to_string()));
        gms.push(Value::Double(gm));
        radii.push(Value::Double(radius));
        densities.push(Value::Double(density));
        magnitudes.push(Value::Double(magnitude));
        albedos.push(Value::Double(albedo));
    }

    Morsel::new(vec![
        Column::from_values("id", ValueType::Integer, ids),
        Column::from_values("planetId", ValueType::Integer, planet_ids),
        Column::from_values("name", ValueType::Varchar, names),
        Column::from_values("gm", ValueType::Double, gms),
        Column::from_values("radius", ValueType::Double, radii),
        Column::from_values("density", ValueType::Double, densities),
        Column::from_values("magnitude", ValueType::Double, magnitudes),
        Column::from_values("albedo", ValueType::Double, albedos),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calypso_appears_exactly_once() {
        let morsel = read().expect("satellites read");
        let names = morsel.column_by_name("name").expect("name column");
        let count = names
            .values
            .iter()
            .filter(|v| v.as_str() == Some("Calypso"))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn seven_distinct_planets_have_moons() {
        let morsel = read().expect("satellites read");
        let planet_ids = morsel.column_by_name("planetId").expect("planetId column");
        let distinct: std::collections::HashSet<i64> = planet_ids
            .values
            .iter()
            .filter_map(|v| match v {
                Value::Integer(i) => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(distinct.len(), 7);
    }

    #[test]
    fn ids_run_one_to_177() {
        let morsel = read().expect("satellites read");
        assert_eq!(morsel.shape(), (177, 8));
        let ids = morsel.column_by_name("id").expect("id column");
        assert_eq!(ids.values[0], Value::Integer(1));
        assert_eq!(ids.values[176], Value::Integer(177));
    }
}
