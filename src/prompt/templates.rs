//! Fixed prompt text: generation rules and worked examples.

/// Generation rules. `{row_cap}` is replaced with the configured cap.
pub const SYSTEM_RULES: &str = r#"You write SQL for an analytics warehouse of NYC yellow taxi trips.

RULES:
- Output ONLY a single SQL query. No Markdown, no backticks, no comments, no explanations.
- READ-ONLY: SELECT statements only.
- Use only the tables and columns in the schema you are given.
- Join taxi_zone_lookup on LocationID to answer questions about boroughs or zones.
- Prefer the partition columns (year, month) when the question names a time period.
- Add LIMIT {row_cap} if the user did not ask for a specific number of rows."#;

/// Worked question and SQL pairs sent as prior turns.
pub const FEW_SHOTS: &[(&str, &str)] = &[
    (
        "Which pickup borough had the highest average tip percentage on Saturday nights in 2024?",
        "SELECT zpu.Borough AS pickup_borough, AVG(tip_amount / NULLIF(fare_amount, 0)) AS avg_tip_pct \
FROM nyc_taxi.yellow_curated y \
LEFT JOIN nyc_taxi.taxi_zone_lookup zpu ON y.pulocationid = zpu.LocationID \
WHERE y.year = 2024 \
AND EXTRACT(DOW FROM y.tpep_pickup_datetime) = 6 \
AND EXTRACT(HOUR FROM y.tpep_pickup_datetime) BETWEEN 20 AND 23 \
AND fare_amount > 0 \
GROUP BY zpu.Borough ORDER BY avg_tip_pct DESC LIMIT 50",
    ),
    (
        "Show trips and total revenue by hour for Manhattan pickups in July 2024.",
        "SELECT date_trunc('hour', y.tpep_pickup_datetime) AS hr, COUNT(*) AS trips, SUM(total_amount) AS revenue \
FROM nyc_taxi.yellow_curated y \
LEFT JOIN nyc_taxi.taxi_zone_lookup zpu ON y.pulocationid = zpu.LocationID \
WHERE y.year = 2024 AND y.month = 7 AND zpu.Borough = 'Manhattan' \
GROUP BY 1 ORDER BY 1 LIMIT 1000",
    ),
];

/// Marker preceding the question in the final user turn.
pub const QUESTION_MARKER: &str = "User question:";

/// Instruction closing every generation turn.
pub const RETURN_ONLY_SQL: &str = "Return only SQL:";
