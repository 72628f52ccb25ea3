//! Canales de comunicación entre tareas.
//!
//! Toda la mensajería del servicio se crea acá, en un solo lugar, y `main`
//! reparte cada extremo a la tarea que lo usa. Los canales de comando son
//! chicos (10) y los de datos más profundos (200). El estado agregado, la
//! sesión, el listado de usuarios y el historial se publican por `watch`
//! porque los consumidores solo necesitan el último valor.


use tokio::sync::{mpsc, watch};
use crate::conectividad::domain::TimerEvent;
use crate::estado::domain::{Actualizacion, Comando, EstadoPlanta};
use crate::gateway::domain::ControlGateway;
use crate::historial::domain::{AccionHistorial, EventoHistorial};
use crate::roles::domain::{ComandoUsuarios, Sesion, UsuarioData};


pub struct Channels {
    pub sondeo_to_watchdog: mpsc::Sender<TimerEvent>,
    pub watchdog_from_sondeo: mpsc::Receiver<TimerEvent>,
    pub watchdog_to_sondeo: mpsc::Sender<TimerEvent>,
    pub sondeo_from_watchdog: mpsc::Receiver<TimerEvent>,
    pub gateway_to_estado: mpsc::Sender<Actualizacion>,
    pub estado_from_gateway: mpsc::Receiver<Actualizacion>,
    pub estado_to_gateway: mpsc::Sender<ControlGateway>,
    pub gateway_from_estado: mpsc::Receiver<ControlGateway>,
    pub comandos_to_estado: mpsc::Sender<Comando>,
    pub estado_from_comandos: mpsc::Receiver<Comando>,
    pub estado_to_historial: mpsc::Sender<AccionHistorial>,
    pub historial_from_estado: mpsc::Receiver<AccionHistorial>,
    pub comandos_to_usuarios: mpsc::Sender<ComandoUsuarios>,
    pub usuarios_from_comandos: mpsc::Receiver<ComandoUsuarios>,
    pub estado_tx: watch::Sender<EstadoPlanta>,
    pub estado_rx: watch::Receiver<EstadoPlanta>,
    pub sesion_tx: watch::Sender<Sesion>,
    pub sesion_rx: watch::Receiver<Sesion>,
    pub usuarios_tx: watch::Sender<Vec<UsuarioData>>,
    pub usuarios_rx: watch::Receiver<Vec<UsuarioData>>,
    pub historial_tx: watch::Sender<Vec<EventoHistorial>>,
    pub historial_rx: watch::Receiver<Vec<EventoHistorial>>,
}


impl Channels {
    pub fn new() -> Self {
        let (sondeo_to_watchdog, watchdog_from_sondeo) = mpsc::channel::<TimerEvent>(10);
        let (watchdog_to_sondeo, sondeo_from_watchdog) = mpsc::channel::<TimerEvent>(10);
        let (gateway_to_estado, estado_from_gateway) = mpsc::channel::<Actualizacion>(200);
        let (estado_to_gateway, gateway_from_estado) = mpsc::channel::<ControlGateway>(10);
        let (comandos_to_estado, estado_from_comandos) = mpsc::channel::<Comando>(10);
        let (estado_to_historial, historial_from_estado) = mpsc::channel::<AccionHistorial>(200);
        let (comandos_to_usuarios, usuarios_from_comandos) = mpsc::channel::<ComandoUsuarios>(10);
        let (estado_tx, estado_rx) = watch::channel(EstadoPlanta::default());
        let (sesion_tx, sesion_rx) = watch::channel(Sesion::default());
        let (usuarios_tx, usuarios_rx) = watch::channel(Vec::new());
        let (historial_tx, historial_rx) = watch::channel(Vec::new());

        Channels {
            sondeo_to_watchdog,
            watchdog_from_sondeo,
            watchdog_to_sondeo,
            sondeo_from_watchdog,
            gateway_to_estado,
            estado_from_gateway,
            estado_to_gateway,
            gateway_from_estado,
            comandos_to_estado,
            estado_from_comandos,
            estado_to_historial,
            historial_from_estado,
            comandos_to_usuarios,
            usuarios_from_comandos,
            estado_tx,
            estado_rx,
            sesion_tx,
            sesion_rx,
            usuarios_tx,
            usuarios_rx,
            historial_tx,
            historial_rx,
        }
    }
}
