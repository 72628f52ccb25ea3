use sqlx::{Executor, PgPool};


/// Marcador de una sola fila con el estado global del sistema.
///
/// La fila se siembra acá, en el arranque: el bootstrap de usuarios la
/// bloquea con `FOR UPDATE`, y un `FOR UPDATE` sobre una fila ausente no
/// bloquea nada.
pub async fn create_table_meta(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS meta_estado (
            unico          BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (unico),
            hay_usuarios   BOOLEAN NOT NULL DEFAULT FALSE
        );
        "#
    )
        .await?;

    sqlx::query(
        "INSERT INTO meta_estado (unico, hay_usuarios) VALUES (TRUE, FALSE)
         ON CONFLICT (unico) DO NOTHING"
    )
        .execute(pool)
        .await?;

    Ok(())
}
