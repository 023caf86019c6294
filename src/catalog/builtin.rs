//! The curated NYC taxi schema compiled into the binary.

use super::{ColumnDescriptor as Col, MetadataSource, SchemaDescriptor};
use crate::error::Result;
use async_trait::async_trait;

/// Serves the curated yellow-trip tables, the zone lookup, the hourly borough
/// view, and the raw landing table (which the default allow-list excludes).
#[derive(Debug, Clone, Default)]
pub struct BuiltinSource;

#[async_trait]
impl MetadataSource for BuiltinSource {
    async fn fetch_tables(&self) -> Result<Vec<SchemaDescriptor>> {
        Ok(nyc_taxi_tables())
    }

    fn name(&self) -> &str {
        "builtin"
    }
}

/// Returns the built-in table descriptors.
pub fn nyc_taxi_tables() -> Vec<SchemaDescriptor> {
    vec![
        yellow_curated(),
        taxi_zone_lookup(),
        v_trips_borough_hour(),
        yellow_tripdata_raw(),
    ]
}

fn yellow_curated() -> SchemaDescriptor {
    SchemaDescriptor::new(
        "nyc_taxi",
        "yellow_curated",
        "Cleaned yellow taxi trips, one row per trip, partitioned by year and month",
    )
    .column(Col::new("vendorid", "int", "TPEP provider: 1 = Creative Mobile, 2 = VeriFone"))
    .column(Col::new("tpep_pickup_datetime", "timestamp", "Meter engaged time").not_null())
    .column(Col::new("tpep_dropoff_datetime", "timestamp", "Meter disengaged time"))
    .column(Col::new("passenger_count", "int", "Passengers reported by the driver"))
    .column(Col::new("trip_distance", "double", "Trip distance in miles"))
    .column(Col::new(
        "ratecodeid",
        "int",
        "Final rate code: 1 standard, 2 JFK, 3 Newark, 4 Nassau/Westchester, 5 negotiated, 6 group ride",
    ))
    .column(Col::new(
        "store_and_fwd_flag",
        "string",
        "Y if the trip record was held in vehicle memory before sending",
    ))
    .column(Col::new("pulocationid", "int", "Pickup taxi zone, joins taxi_zone_lookup.LocationID"))
    .column(Col::new("dolocationid", "int", "Dropoff taxi zone, joins taxi_zone_lookup.LocationID"))
    .column(Col::new(
        "payment_type",
        "int",
        "1 credit card, 2 cash, 3 no charge, 4 dispute, 5 unknown, 6 voided",
    ))
    .column(Col::new("fare_amount", "double", "Time-and-distance fare in USD"))
    .column(Col::new("extra", "double", "Rush hour and overnight surcharges"))
    .column(Col::new("mta_tax", "double", "MTA tax"))
    .column(Col::new("tip_amount", "double", "Tip in USD, credit card tips only"))
    .column(Col::new("tolls_amount", "double", "Tolls paid in USD"))
    .column(Col::new("improvement_surcharge", "double", "Improvement surcharge"))
    .column(Col::new("total_amount", "double", "Total charged to the passenger, excluding cash tips"))
    .column(Col::new("congestion_surcharge", "double", "NY State congestion surcharge"))
    .column(Col::new("airport_fee", "double", "Fee for pickups at LaGuardia and JFK"))
    .column(Col::new("year", "int", "Partition: pickup year").not_null())
    .column(Col::new("month", "int", "Partition: pickup month 1-12").not_null())
}

fn taxi_zone_lookup() -> SchemaDescriptor {
    SchemaDescriptor::new("nyc_taxi", "taxi_zone_lookup", "TLC taxi zones with their borough")
        .column(Col::new("LocationID", "int", "Zone id").not_null())
        .column(Col::new(
            "Borough",
            "string",
            "Manhattan, Brooklyn, Queens, Bronx, Staten Island, EWR or Unknown",
        ))
        .column(Col::new("Zone", "string", "Zone name"))
        .column(Col::new("service_zone", "string", "Yellow Zone, Boro Zone, Airports or EWR"))
}

fn v_trips_borough_hour() -> SchemaDescriptor {
    SchemaDescriptor::new(
        "nyc_taxi",
        "v_trips_borough_hour",
        "View of trips with pickup hour and pickup/dropoff borough already joined",
    )
    .column(Col::new("pickup_hour", "timestamp", "Pickup time truncated to the hour"))
    .column(Col::new("pickup_borough", "string", "Borough of the pickup zone"))
    .column(Col::new("dropoff_borough", "string", "Borough of the dropoff zone"))
    .column(Col::new("trip_distance", "double", "Trip distance in miles"))
    .column(Col::new("passenger_count", "int", "Passengers reported by the driver"))
    .column(Col::new("fare_amount", "double", "Time-and-distance fare in USD"))
    .column(Col::new("tip_amount", "double", "Tip in USD"))
    .column(Col::new("total_amount", "double", "Total charged in USD"))
}

fn yellow_tripdata_raw() -> SchemaDescriptor {
    SchemaDescriptor::new(
        "nyc_taxi_raw",
        "yellow_tripdata",
        "Raw landing table as crawled from the TLC files",
    )
    .column(Col::new("vendorid", "bigint", ""))
    .column(Col::new("tpep_pickup_datetime", "string", ""))
    .column(Col::new("tpep_dropoff_datetime", "string", ""))
    .column(Col::new("passenger_count", "double", ""))
    .column(Col::new("trip_distance", "double", ""))
    .column(Col::new("pulocationid", "bigint", ""))
    .column(Col::new("dolocationid", "bigint", ""))
    .column(Col::new("fare_amount", "double", ""))
    .column(Col::new("tip_amount", "double", ""))
    .column(Col::new("total_amount", "double", ""))
}
