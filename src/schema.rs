// Mirrors migrations/2023-08-29-120000_create_plant_tables/up.sql.

diesel::table! {
    botanist (id) {
        id -> Int8,
        botanist_name -> Text,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
    }
}

diesel::table! {
    plant (id) {
        id -> Int8,
        general_name -> Text,
        scientific_name -> Nullable<Text>,
        cycle -> Nullable<Text>,
        // identifier assigned by the plants API
        plant_id -> Int8,
        botanist_id -> Int8,
    }
}

diesel::table! {
    recording (id) {
        id -> Int8,
        recorded -> Timestamptz,
        temperature -> Float8,
        soil_moisture -> Float8,
        watered -> Timestamptz,
        sunlight -> Nullable<Text>,
        // references plant.id, not the API identifier
        plant_id -> Int8,
    }
}

diesel::joinable!(plant -> botanist (botanist_id));
diesel::joinable!(recording -> plant (plant_id));

diesel::allow_tables_to_appear_in_same_query!(botanist, plant, recording,);
