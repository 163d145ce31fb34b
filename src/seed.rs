use std::collections::HashMap;

use sqlx::{PgPool, Row};
use tracing::info;

/// (name, regional economic community)
const REGIONS: &[(&str, &str)] = &[
    ("North Africa", "UMA"),
    ("West Africa", "ECOWAS"),
    ("Central Africa", "ECCAS"),
    ("East Africa", "EAC/IGAD"),
    ("Southern Africa", "SADC"),
];

/// (number, name, 2063 target)
const GOALS: &[(i32, &str, Option<&str>)] = &[
    (1, "A high standard of living, quality of life and well-being for all citizens", Some("GDP per capita at least $12,000")),
    (2, "Well-educated citizens and skills revolution underpinned by science, technology and innovation", Some("Universal literacy and enrollment")),
    (3, "Healthy and well-nourished citizens", Some("Life expectancy of 75 years")),
    (4, "Transformed economies", None),
    (5, "Modern agriculture for increased productivity and production", None),
    (7, "Environmentally sustainable and climate resilient economies and communities", None),
    (10, "World class infrastructure criss-crosses Africa", Some("Universal electricity and internet access")),
    (17, "Full gender equality in all spheres of life", Some("50% women's representation")),
    (18, "Engaged and empowered youth and children", Some("Youth unemployment below 6%")),
    (20, "Africa takes full responsibility for financing her development", None),
];

/// (name, iso2, iso3, region)
const MEMBER_STATES: &[(&str, &str, &str, &str)] = &[
    ("Algeria", "DZ", "DZA", "North Africa"),
    ("Egypt", "EG", "EGY", "North Africa"),
    ("Libya", "LY", "LBY", "North Africa"),
    ("Mauritania", "MR", "MRT", "North Africa"),
    ("Morocco", "MA", "MAR", "North Africa"),
    ("Tunisia", "TN", "TUN", "North Africa"),
    ("Benin", "BJ", "BEN", "West Africa"),
    ("Burkina Faso", "BF", "BFA", "West Africa"),
    ("Cabo Verde", "CV", "CPV", "West Africa"),
    ("Cote d'Ivoire", "CI", "CIV", "West Africa"),
    ("Gambia", "GM", "GMB", "West Africa"),
    ("Ghana", "GH", "GHA", "West Africa"),
    ("Guinea", "GN", "GIN", "West Africa"),
    ("Guinea-Bissau", "GW", "GNB", "West Africa"),
    ("Liberia", "LR", "LBR", "West Africa"),
    ("Mali", "ML", "MLI", "West Africa"),
    ("Niger", "NE", "NER", "West Africa"),
    ("Nigeria", "NG", "NGA", "West Africa"),
    ("Senegal", "SN", "SEN", "West Africa"),
    ("Sierra Leone", "SL", "SLE", "West Africa"),
    ("Togo", "TG", "TGO", "West Africa"),
    ("Burundi", "BI", "BDI", "Central Africa"),
    ("Cameroon", "CM", "CMR", "Central Africa"),
    ("Central African Republic", "CF", "CAF", "Central Africa"),
    ("Chad", "TD", "TCD", "Central Africa"),
    ("Congo", "CG", "COG", "Central Africa"),
    ("Democratic Republic of the Congo", "CD", "COD", "Central Africa"),
    ("Equatorial Guinea", "GQ", "GNQ", "Central Africa"),
    ("Gabon", "GA", "GAB", "Central Africa"),
    ("Sao Tome and Principe", "ST", "STP", "Central Africa"),
    ("Comoros", "KM", "COM", "East Africa"),
    ("Djibouti", "DJ", "DJI", "East Africa"),
    ("Eritrea", "ER", "ERI", "East Africa"),
    ("Ethiopia", "ET", "ETH", "East Africa"),
    ("Kenya", "KE", "KEN", "East Africa"),
    ("Madagascar", "MG", "MDG", "East Africa"),
    ("Mauritius", "MU", "MUS", "East Africa"),
    ("Rwanda", "RW", "RWA", "East Africa"),
    ("Seychelles", "SC", "SYC", "East Africa"),
    ("Somalia", "SO", "SOM", "East Africa"),
    ("South Sudan", "SS", "SSD", "East Africa"),
    ("Sudan", "SD", "SDN", "East Africa"),
    ("Tanzania", "TZ", "TZA", "East Africa"),
    ("Uganda", "UG", "UGA", "East Africa"),
    ("Angola", "AO", "AGO", "Southern Africa"),
    ("Botswana", "BW", "BWA", "Southern Africa"),
    ("Eswatini", "SZ", "SWZ", "Southern Africa"),
    ("Lesotho", "LS", "LSO", "Southern Africa"),
    ("Malawi", "MW", "MWI", "Southern Africa"),
    ("Mozambique", "MZ", "MOZ", "Southern Africa"),
    ("Namibia", "NA", "NAM", "Southern Africa"),
    ("South Africa", "ZA", "ZAF", "Southern Africa"),
    ("Zambia", "ZM", "ZMB", "Southern Africa"),
    ("Zimbabwe", "ZW", "ZWE", "Southern Africa"),
];

/// (code, name, unit, goal number, target value, baseline value)
const INDICATORS: &[(&str, &str, &str, i32, Option<f64>, Option<f64>)] = &[
    ("NY.GDP.PCAP.CD", "GDP per capita (current US$)", "US$", 1, Some(12000.0), None),
    ("SI.POV.DDAY", "Poverty headcount ratio ($2.15/day)", "%", 1, Some(3.0), None),
    ("SE.ADT.LITR.ZS", "Adult literacy rate", "%", 2, Some(100.0), None),
    ("SE.PRM.ENRR", "Primary school enrollment (gross)", "%", 2, Some(100.0), None),
    ("SE.SEC.ENRR", "Secondary school enrollment (gross)", "%", 2, Some(100.0), None),
    ("SP.DYN.LE00.IN", "Life expectancy at birth", "years", 3, Some(75.0), None),
    ("SH.STA.MMRT", "Maternal mortality ratio", "per 100,000 live births", 3, Some(50.0), Some(600.0)),
    ("SH.DYN.MORT", "Under-5 mortality rate", "per 1,000 live births", 3, Some(25.0), Some(150.0)),
    ("SH.STA.BRTC.ZS", "Births attended by skilled health staff", "%", 3, Some(100.0), None),
    ("SH.HIV.INCD.TL.P3", "HIV incidence", "per 1,000 uninfected", 3, None, None),
    ("NV.IND.MANF.ZS", "Manufacturing value added", "% of GDP", 4, None, None),
    ("BX.KLT.DINV.WD.GD.ZS", "FDI net inflows", "% of GDP", 4, None, None),
    ("NV.AGR.TOTL.ZS", "Agriculture value added", "% of GDP", 5, None, None),
    ("EN.ATM.CO2E.PC", "CO2 emissions per capita", "metric tons", 7, None, None),
    ("EG.FEC.RNEW.ZS", "Renewable energy consumption", "% of final energy", 7, None, None),
    ("IT.NET.USER.ZS", "Internet users", "% of population", 10, Some(100.0), None),
    ("IT.CEL.SETS.P2", "Mobile subscriptions", "per 100 people", 10, None, None),
    ("EG.ELC.ACCS.ZS", "Access to electricity", "% of population", 10, Some(100.0), None),
    ("SG.GEN.PARL.ZS", "Women in national parliament", "% of seats", 17, Some(50.0), None),
    ("SE.ENR.PRIM.FM.ZS", "Gender parity index, primary enrollment", "ratio", 17, Some(1.0), None),
    ("SL.TLF.CACT.FE.ZS", "Female labor force participation", "%", 17, None, None),
    ("SP.ADO.TFRT", "Adolescent fertility rate", "births per 1,000 women 15-19", 17, None, None),
    ("SL.UEM.1524.ZS", "Youth unemployment", "% of labor force 15-24", 18, Some(6.0), None),
    ("GC.TAX.TOTL.GD.ZS", "Tax revenue", "% of GDP", 20, None, None),
];

/// Upserts the reference catalogs. Safe to re-run; keyed on natural codes.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    for (name, rec_name) in REGIONS {
        sqlx::query(
            r#"
            INSERT INTO indicator_watch.regions (name, rec_name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET rec_name = EXCLUDED.rec_name
            "#,
        )
        .bind(name)
        .bind(rec_name)
        .execute(pool)
        .await?;
    }

    let region_ids: HashMap<String, i64> =
        sqlx::query("SELECT id, name FROM indicator_watch.regions")
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|row| (row.get("name"), row.get("id")))
            .collect();

    for (number, name, target) in GOALS {
        sqlx::query(
            r#"
            INSERT INTO indicator_watch.goals (number, name, target_2063)
            VALUES ($1, $2, $3)
            ON CONFLICT (number) DO UPDATE
            SET name = EXCLUDED.name, target_2063 = EXCLUDED.target_2063
            "#,
        )
        .bind(number)
        .bind(name)
        .bind(target)
        .execute(pool)
        .await?;
    }

    let goal_ids: HashMap<i32, i64> = sqlx::query("SELECT id, number FROM indicator_watch.goals")
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| (row.get("number"), row.get("id")))
        .collect();

    for (name, iso2, iso3, region) in MEMBER_STATES {
        sqlx::query(
            r#"
            INSERT INTO indicator_watch.member_states (name, iso_code, iso3_code, region_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (iso_code) DO UPDATE
            SET name = EXCLUDED.name, iso3_code = EXCLUDED.iso3_code,
                region_id = EXCLUDED.region_id
            "#,
        )
        .bind(name)
        .bind(iso2)
        .bind(iso3)
        .bind(region_ids.get(*region))
        .execute(pool)
        .await?;
    }

    for (code, name, unit, goal_number, target, baseline) in INDICATORS {
        sqlx::query(
            r#"
            INSERT INTO indicator_watch.indicators
                (code, name, unit, goal_id, target_value, baseline_value)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (code) DO UPDATE
            SET name = EXCLUDED.name, unit = EXCLUDED.unit, goal_id = EXCLUDED.goal_id,
                target_value = EXCLUDED.target_value, baseline_value = EXCLUDED.baseline_value
            "#,
        )
        .bind(code)
        .bind(name)
        .bind(unit)
        .bind(goal_ids.get(goal_number))
        .bind(target)
        .bind(baseline)
        .execute(pool)
        .await?;
    }

    info!(
        regions = REGIONS.len(),
        goals = GOALS.len(),
        member_states = MEMBER_STATES.len(),
        indicators = INDICATORS.len(),
        "reference data seeded"
    );
    Ok(())
}
