//! Query templates over the JHU CSSE daily summary table.
//!
//! Placeholders: `<country>`, `<country_list>`, `<start_date>`.

/// Fully-qualified source table.
pub const SUMMARY_TABLE: &str = "`bigquery-public-data.covid19_jhu_csse_eu.summary`";

pub const COUNTRIES_RANKING: &str = r#"
WITH available AS (
    SELECT MAX(date) AS latest_date_published
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`
)
SELECT country_region, CAST(MAX(date) AS STRING) AS latest,
       SUM(confirmed) AS total_confirmed, SUM(deaths) AS total_dead,
       100 * SAFE_DIVIDE(SUM(deaths), SUM(confirmed)) AS drate
FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`, available
WHERE date = latest_date_published
GROUP BY country_region
ORDER BY total_confirmed DESC, total_dead DESC
LIMIT 5
"#;

pub const COUNTRIES: &str = r#"
SELECT DISTINCT country_region
FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`
WHERE DATE_DIFF(CURRENT_DATE(), date, YEAR) < 1
ORDER BY country_region ASC
"#;

pub const COUNTRY_LATEST_DATE: &str = r#"
SELECT CAST(MAX(date) AS STRING) AS latest_date
FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`
WHERE country_region = '<country>'
"#;

pub const COUNTRY_LATEST_DATE_TOTAL_CONFIRMED: &str = r#"
WITH available AS (
    SELECT MAX(date) AS latest_date_published
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`
    WHERE country_region = '<country>'
)
SELECT CAST(MAX(date) AS STRING) AS latest, SUM(confirmed) AS total_confirmed
FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`, available
WHERE country_region = '<country>' AND date = latest_date_published
"#;

pub const COUNTRY_LATEST_DATE_TOTAL_DEAD: &str = r#"
WITH available AS (
    SELECT MAX(date) AS latest_date_published
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`
    WHERE country_region = '<country>'
)
SELECT CAST(MAX(date) AS STRING) AS latest, SUM(deaths) AS total_dead
FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`, available
WHERE country_region = '<country>' AND date = latest_date_published
"#;

pub const COUNTRY_LATEST_DATE_TOTAL: &str = r#"
WITH available AS (
    SELECT MAX(date) AS latest_date_published
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`
    WHERE country_region = '<country>'
)
SELECT CAST(MAX(date) AS STRING) AS latest_date,
       SUM(confirmed) AS total_confirmed, SUM(deaths) AS total_dead
FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`, available
WHERE country_region = '<country>' AND date = latest_date_published
GROUP BY country_region
"#;

pub const COUNTRY_LATEST_DATE_TOTAL_BY_TERRITORY: &str = r#"
WITH available AS (
    SELECT MAX(date) AS latest_date_published
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`
    WHERE country_region = '<country>'
)
SELECT province_state AS territory, CAST(MAX(date) AS STRING) AS latest,
       SUM(confirmed) AS total_confirmed, SUM(deaths) AS total_dead
FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`, available
WHERE country_region = '<country>' AND date = latest_date_published
GROUP BY territory
ORDER BY territory
"#;

pub const COUNTRY_TERRITORIES: &str = r#"
SELECT DISTINCT(province_state) AS territory
FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`
WHERE country_region = '<country>' AND province_state IS NOT NULL
"#;

pub const COUNTRY_SUMMARY: &str = r#"
WITH available AS (
    SELECT MAX(date) AS latest_date_published
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`
    WHERE country_region = '<country>'
)
SELECT country_region, CAST(MAX(date) AS STRING) AS latest,
       SUM(confirmed) AS total_confirmed, SUM(deaths) AS total_dead,
       100 * SAFE_DIVIDE(SUM(deaths), SUM(confirmed)) AS drate
FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`, available
WHERE country_region = '<country>' AND date = latest_date_published
GROUP BY country_region
"#;

pub const COUNTRY_EVOLUTION: &str = r#"
WITH
available AS (
    SELECT MAX(date) AS latest_date_published,
           DATE_SUB(MAX(date), INTERVAL 1 MONTH) AS month_before,
           DATE_SUB(MAX(date), INTERVAL 2 MONTH) AS month_2_before
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`
    WHERE country_region = '<country>'
),
latest_data AS (
    SELECT country_region, date, SUM(confirmed) AS total_confirmed, SUM(deaths) AS total_dead
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`, available
    WHERE country_region = '<country>' AND date = latest_date_published
    GROUP BY date, country_region
),
month_before_data AS (
    SELECT date, SUM(confirmed) AS mb_total_confirmed, SUM(deaths) AS mb_total_dead
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`, available
    WHERE country_region = '<country>' AND date = month_before
    GROUP BY date, country_region
),
month_2_before_data AS (
    SELECT date, SUM(confirmed) AS m2b_total_confirmed, SUM(deaths) AS m2b_total_dead
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`, available
    WHERE country_region = '<country>' AND date = month_2_before
    GROUP BY date, country_region
),
stats AS (
    SELECT 100 * SAFE_DIVIDE(total_dead, total_confirmed) AS drate,
           total_confirmed - mb_total_confirmed AS inc_m_confirmed,
           total_dead - mb_total_dead AS inc_m_dead,
           mb_total_confirmed - m2b_total_confirmed AS inc_m2_confirmed,
           mb_total_dead - m2b_total_dead AS inc_m2_dead
    FROM latest_data, month_before_data, month_2_before_data
),
change_stats AS (
    SELECT SAFE_DIVIDE(inc_m_confirmed - inc_m2_confirmed, inc_m_confirmed + inc_m2_confirmed) AS rate_inc_c_m2,
           SAFE_DIVIDE(inc_m_dead - inc_m2_dead, inc_m_dead + inc_m2_dead) AS rate_inc_d_m2
    FROM stats
)
SELECT country_region, CAST(latest_date_published AS STRING) AS latest_date,
       total_confirmed, total_dead, drate, inc_m_confirmed, inc_m_dead,
       rate_inc_c_m2, rate_inc_d_m2
FROM available, latest_data, stats, change_stats
"#;

pub const COUNTRY_CLOSEST_DATE: &str = r#"
SELECT CAST(MAX(date) AS STRING) AS closest_available_date
FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`
WHERE country_region = '<country>'
  AND DATE_DIFF(DATE "<start_date>", date, DAY) >= 0
"#;

pub const COUNTRY_CLOSEST_DATE_TOTAL: &str = r#"
WITH
closest AS (
    SELECT MAX(date) AS published_date
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`
    WHERE country_region = '<country>'
      AND DATE_DIFF(DATE "<start_date>", date, DAY) >= 0
),
available AS (
    SELECT published_date AS latest_date_published,
           DATE_SUB(published_date, INTERVAL 1 MONTH) AS month_before,
           DATE_SUB(published_date, INTERVAL 2 MONTH) AS month_2_before
    FROM closest
),
latest_data AS (
    SELECT country_region, date, SUM(confirmed) AS total_confirmed, SUM(deaths) AS total_dead
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`, available
    WHERE country_region = '<country>' AND date = latest_date_published
    GROUP BY date, country_region
),
month_before_data AS (
    SELECT date, SUM(confirmed) AS mb_total_confirmed, SUM(deaths) AS mb_total_dead
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`, available
    WHERE country_region = '<country>' AND date = month_before
    GROUP BY date, country_region
),
month_2_before_data AS (
    SELECT date, SUM(confirmed) AS m2b_total_confirmed, SUM(deaths) AS m2b_total_dead
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`, available
    WHERE country_region = '<country>' AND date = month_2_before
    GROUP BY date, country_region
),
stats AS (
    SELECT 100 * SAFE_DIVIDE(total_dead, total_confirmed) AS drate,
           total_confirmed - mb_total_confirmed AS inc_m_confirmed,
           total_dead - mb_total_dead AS inc_m_dead,
           mb_total_confirmed - m2b_total_confirmed AS inc_m2_confirmed,
           mb_total_dead - m2b_total_dead AS inc_m2_dead
    FROM latest_data, month_before_data, month_2_before_data
),
change_stats AS (
    SELECT SAFE_DIVIDE(inc_m_confirmed - inc_m2_confirmed, inc_m_confirmed + inc_m2_confirmed) AS rate_inc_c_m2,
           SAFE_DIVIDE(inc_m_dead - inc_m2_dead, inc_m_dead + inc_m2_dead) AS rate_inc_d_m2
    FROM stats
)
SELECT country_region, CAST(latest_date_published AS STRING) AS latest_date,
       total_confirmed, total_dead, drate, inc_m_confirmed, inc_m_dead,
       rate_inc_c_m2, rate_inc_d_m2
FROM available, latest_data, stats, change_stats
"#;

pub const COUNTRY_CLOSEST_DATE_TOTAL_BY_TERRITORY: &str = r#"
WITH closest AS (
    SELECT MAX(date) AS published_date
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`
    WHERE country_region = '<country>'
      AND DATE_DIFF(DATE "<start_date>", date, DAY) >= 0
)
SELECT CAST(closest.published_date AS STRING) AS latest_date,
       province_state AS territory,
       SUM(confirmed) AS total_confirmed, SUM(deaths) AS total_dead,
       100 * SAFE_DIVIDE(SUM(deaths), SUM(confirmed)) AS drate
FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`, closest
WHERE country_region = '<country>' AND date = closest.published_date
GROUP BY closest.published_date, territory
ORDER BY closest.published_date DESC, territory ASC
"#;

pub const COUNTRY_LIST_SUMMARY: &str = r#"
WITH published AS (
    SELECT MAX(date) AS latest, country_region AS country
    FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`
    WHERE country_region IN (<country_list>)
    GROUP BY country_region
)
SELECT CAST(latest AS STRING) AS latest_date, country,
       SUM(confirmed) AS total_confirmed, SUM(deaths) AS total_dead
FROM `bigquery-public-data.covid19_jhu_csse_eu.summary`, published
WHERE date = latest AND country_region = country
GROUP BY country, latest
"#;
