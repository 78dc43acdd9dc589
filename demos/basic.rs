//! Builds a CREATE TABLE, an INSERT with RETURNING, a filtered SELECT,
//! and an UPDATE against the same table, rendered once per dialect.
//!
//! Run with `cargo run --example basic`.

use std::rc::Rc;

use sqlforge::create::create_table;
use sqlforge::dialect::Dialect;
use sqlforge::expr::{assign, equal, field, v};
use sqlforge::format::Format;
use sqlforge::insert::insert_into;
use sqlforge::part::DataSource;
use sqlforge::schema::TableDef;
use sqlforge::select::select;
use sqlforge::update::update;

fn customers_table() -> Rc<TableDef> {
    let mut t = TableDef::new("Customers");
    t.fields.add_autoinc("Id").primary_key();
    t.fields.add_unicode_variable("Name", 100).not_null();
    t.fields.add_unicode_variable("Email", 200);
    Rc::new(t)
}

fn main() {
    for dialect in [Dialect::MSTSQL, Dialect::PGSQL, Dialect::MYSQL, Dialect::SQLITE] {
        println!("== {} ==", dialect.name());

        let table = customers_table();
        let mut format = Format::new(dialect).exists_guard();
        let batch = create_table(table.clone()).build(&mut format).unwrap();
        for stat in &batch.items {
            println!("{}", stat.sql());
        }

        let source = DataSource::table(table.clone());
        let mut format = Format::new(dialect);
        let batch = insert_into(source.clone(), &["Name", "Email"])
            .values(v("Ann"), vec![Box::new(v("ann@example.com"))])
            .returning(field(source.clone(), "Id"), vec![])
            .build(&mut format)
            .unwrap();
        for stat in &batch.items {
            println!("{}", stat.sql());
        }

        let mut format = Format::new(dialect);
        let batch = select(vec![Box::new(field(source.clone(), "Name")), Box::new(field(source.clone(), "Email"))])
            .from(source.clone())
            .where_(equal(field(source.clone(), "Name"), "Ann"))
            .build(&mut format)
            .unwrap();
        for stat in &batch.items {
            println!("{}", stat.sql());
        }

        let mut format = Format::new(dialect);
        let batch = update(source.clone(), vec![assign(field(source.clone(), "Email"), "ann@newmail.com")])
            .where_(equal(field(source.clone(), "Id"), 1i32))
            .build(&mut format)
            .unwrap();
        for stat in &batch.items {
            println!("{}", stat.sql());
        }

        println!();
    }
}
